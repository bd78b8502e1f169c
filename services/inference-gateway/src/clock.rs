//! Wall-clock timestamps in the audit format.

/// `DD/MM/YYYY HH:MM:SS`, zero padded, local time.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

pub fn now_stamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn stamp_is_fixed_width_and_parses_back() {
        let s = now_stamp();
        assert_eq!(s.len(), 19);
        assert!(NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).is_ok());
    }
}
