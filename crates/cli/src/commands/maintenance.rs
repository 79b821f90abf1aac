// Cleanup, recovery and purge commands

use crate::output::{print_field, OutputFormat};
use anyhow::Result;
use campuslog_durable::admin::StepStatus;
use campuslog_durable::AdminFacade;

pub async fn cleanup(admin: &AdminFacade, output: OutputFormat, keep_today_only: bool) -> Result<()> {
    let report = admin.cleanup(keep_today_only).await?;

    if output.is_text() {
        for name in &report.deleted {
            println!("deleted  {name}");
        }
        for name in &report.failed {
            println!("FAILED   {name}");
        }
        print_field("Deleted", &report.deleted.len().to_string());
        print_field("Kept", &report.kept.len().to_string());
    } else {
        output.print_value(&report)?;
    }

    if !report.failed.is_empty() {
        anyhow::bail!("{} file(s) could not be deleted", report.failed.len());
    }
    Ok(())
}

pub async fn recover(admin: &AdminFacade, output: OutputFormat) -> Result<()> {
    let report = admin.cleanup_and_import_errors().await;

    if output.is_text() {
        for step in &report.steps {
            let marker = match step.status {
                StepStatus::Completed => "ok",
                StepStatus::Failed => "FAILED",
                StepStatus::Skipped => "skipped",
            };
            println!("{:<8} {:?}: {}", marker, step.step, step.message);
        }
    } else {
        output.print_value(&report)?;
    }

    if !report.succeeded() {
        anyhow::bail!("recovery did not complete");
    }
    Ok(())
}

pub async fn purge(admin: &AdminFacade, output: OutputFormat, read_only: bool) -> Result<()> {
    let deleted = if read_only {
        admin.delete_read_errors().await?
    } else {
        admin.delete_all_logs().await?
    };

    if output.is_text() {
        print_field("Deleted", &deleted.to_string());
    } else {
        output.print_value(&serde_json::json!({ "affected": deleted }))?;
    }
    Ok(())
}
