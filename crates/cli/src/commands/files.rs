// Partition file listing command

use crate::output::{print_table_header, print_table_row, OutputFormat};
use anyhow::Result;
use campuslog_durable::AdminFacade;

pub async fn run(admin: &AdminFacade, output: OutputFormat) -> Result<()> {
    let files = admin.list_files_info().await?;

    if !output.is_text() {
        return output.print_value(&serde_json::json!({ "data": files, "total": files.len() }));
    }

    if files.is_empty() {
        println!("No log files found");
        return Ok(());
    }

    print_table_header(&[("NAME", 20), ("SIZE", 10), ("LINES", 8), ("MODIFIED", 19)]);
    for file in &files {
        let size = file.size_bytes.to_string();
        let lines = file.line_count.to_string();
        let modified = file
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        print_table_row(&[(&file.name, 20), (&size, 10), (&lines, 8), (&modified, 19)]);
    }

    Ok(())
}
