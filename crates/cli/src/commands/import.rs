// Import command

use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};
use anyhow::Result;
use campuslog_durable::{AdminFacade, ImportOptions, ImportSummary, ImportTarget};

/// Arguments of `campuslog import`
#[derive(Debug, Clone, Default)]
pub struct ImportArgs {
    pub file: Option<String>,
    pub today: bool,
    pub limit_per_file: Option<usize>,
    pub all_levels: bool,
}

impl ImportArgs {
    pub fn target(&self) -> ImportTarget {
        match (&self.file, self.today) {
            (Some(file), _) => ImportTarget::File(file.clone()),
            (None, true) => ImportTarget::Today,
            (None, false) => ImportTarget::All,
        }
    }

    pub fn options(&self) -> ImportOptions {
        let options = if self.all_levels {
            ImportOptions::everything()
        } else {
            ImportOptions::errors()
        };
        options.with_per_file_limit(self.limit_per_file)
    }
}

pub async fn run(
    admin: &AdminFacade,
    output: OutputFormat,
    quiet: bool,
    args: &ImportArgs,
) -> Result<()> {
    let summary = admin.import_with(&args.target(), &args.options()).await?;

    if output.is_text() {
        print_summary(&summary, quiet);
    } else {
        output.print_value(&summary)?;
    }

    if summary.files_failed > 0 {
        anyhow::bail!("{} file(s) failed to import", summary.files_failed);
    }
    Ok(())
}

fn print_summary(summary: &ImportSummary, quiet: bool) {
    if !quiet && !summary.files.is_empty() {
        print_table_header(&[("FILE", 20), ("READ", 8), ("IMPORTED", 8), ("DUPS", 6), ("ERROR", 30)]);
        for file in &summary.files {
            let read = file.lines_read.to_string();
            let imported = file.records_imported.to_string();
            let dups = file.duplicates.to_string();
            let error = file.error.as_deref().unwrap_or("-");
            print_table_row(&[
                (&file.file, 20),
                (&read, 8),
                (&imported, 8),
                (&dups, 6),
                (error, 30),
            ]);
        }
        println!();
    }

    print_field("Files", &summary.files_processed.to_string());
    print_field("Imported", &summary.records_imported.to_string());
    print_field("Duplicates", &summary.duplicates.to_string());
    print_field("Skipped", &summary.lines_skipped.to_string());
    if summary.files_failed > 0 {
        print_field("Failed", &summary.files_failed.to_string());
    }
    if summary.cancelled {
        println!("Import was interrupted before every file was processed");
    }
}
