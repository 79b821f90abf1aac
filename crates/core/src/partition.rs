// Date-partitioned file naming: app_<YYYY-MM-DD>.log

use chrono::NaiveDate;

pub const FILE_PREFIX: &str = "app_";
pub const FILE_SUFFIX: &str = ".log";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// File name for a calendar day
pub fn partition_file_name(date: NaiveDate) -> String {
    format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date.format(DATE_FORMAT))
}

/// Calendar day of a partition file name, `None` for anything else
pub fn partition_date(file_name: &str) -> Option<NaiveDate> {
    let date = file_name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_parse() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(partition_file_name(date), "app_2025-01-01.log");
        assert_eq!(partition_date("app_2025-01-01.log"), Some(date));
    }

    #[test]
    fn test_foreign_names_rejected() {
        assert_eq!(partition_date("app_2025-13-01.log"), None);
        assert_eq!(partition_date("app_latest.log"), None);
        assert_eq!(partition_date("other_2025-01-01.log"), None);
        assert_eq!(partition_date("app_2025-01-01.log.gz"), None);
    }
}
