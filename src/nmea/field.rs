//! Positional access to comma-delimited sentence fields.

/// Return field `index` of a sentence body.
///
/// Field 0 is the address (`GPRMC`), field 1 the first data field and so on.
/// A field past the end of the sentence comes back as `""`, never an error,
/// so callers decide what an absent value means.
pub fn field(body: &str, index: usize) -> &str {
    body.split(',').nth(index).unwrap_or("")
}

/// Number of fields in a sentence body, address included.
pub fn field_count(body: &str) -> usize {
    body.split(',').count()
}

/// Parse a numeric field, treating empty or garbled text as absent.
pub fn number(body: &str, index: usize) -> Option<f64> {
    let text = field(body, index).trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer field, treating empty or garbled text as absent.
pub fn integer(body: &str, index: usize) -> Option<i64> {
    let text = field(body, index).trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<i64>()
        .ok()
        .or_else(|| number(body, index).map(|v| v as i64))
}

/// First character of a field, if any.
pub fn letter(body: &str, index: usize) -> Option<char> {
    field(body, index).chars().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";

    #[test]
    fn test_fields_by_position() {
        assert_eq!(field(BODY, 0), "GPRMC");
        assert_eq!(field(BODY, 1), "123519");
        assert_eq!(field(BODY, 7), "022.4");
        assert_eq!(field(BODY, 11), "W");
    }

    #[test]
    fn test_missing_field_is_empty() {
        assert_eq!(field(BODY, 12), "");
        assert_eq!(field(BODY, 200), "");
        assert_eq!(field("GPHDT", 1), "");
    }

    #[test]
    fn test_rejoining_fields_reproduces_body() {
        for body in [
            BODY,
            "IIMWV,,R,,N,A",
            "PGENV,12.6,1,-3.2,1,21.5,0,1.2,3.4,1596201600",
            "X",
        ] {
            let joined: Vec<&str> = (0..field_count(body)).map(|i| field(body, i)).collect();
            assert_eq!(joined.join(","), body);
        }
    }

    #[test]
    fn test_empty_number_is_absent_not_zero() {
        let body = "IIMWV,,R,8.1,N,A";
        assert_eq!(number(body, 1), None);
        assert_eq!(number(body, 3), Some(8.1));
        assert_eq!(number(body, 2), None);
        assert_eq!(number(body, 9), None);
    }

    #[test]
    fn test_integer_accepts_decimal_text() {
        let body = "PGENV,12.6,2.0,-3.2,1";
        assert_eq!(integer(body, 2), Some(2));
        assert_eq!(integer(body, 4), Some(1));
        assert_eq!(integer(body, 7), None);
    }

    #[test]
    fn test_letter() {
        assert_eq!(letter(BODY, 4), Some('N'));
        assert_eq!(letter(BODY, 20), None);
    }
}
