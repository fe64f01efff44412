//! Splits raw link bytes into checksummed sentences.
//!
//! A single read from a serial line or TCP socket may hold part of a
//! sentence, exactly one sentence, or several back to back. The framer cuts
//! at the first line terminator, keeps whatever follows for the next turn,
//! and only lets through sentences whose `*HH` checksum matches.

use crate::error::FrameError;
use crate::nmea::Sentence;

/// Upper bound for bytes held while waiting for a terminator.
pub const MAX_PENDING: usize = 4096;

fn is_start_marker(byte: u8) -> bool {
    byte == b'$' || byte == b'!'
}

fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// XOR of every byte in `body`.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Cut `buf` at its first line terminator.
///
/// Returns the line (without terminator) and, when another sentence follows
/// in the same buffer, the bytes after the terminator run.
pub fn split_frame(buf: &[u8]) -> (&[u8], Option<&[u8]>) {
    match buf.iter().position(|b| is_terminator(*b)) {
        Some(end) => {
            let rest_start = buf[end..]
                .iter()
                .position(|b| !is_terminator(*b))
                .map(|p| end + p)
                .unwrap_or(buf.len());
            let rest = &buf[rest_start..];
            let rest = if rest.iter().any(|b| *b != 0) {
                Some(rest)
            } else {
                None
            };
            (&buf[..end], rest)
        }
        None => (buf, None),
    }
}

/// Frame one sentence out of `buf` in place.
///
/// `buf` is truncated at its terminator. Anything after it is moved into
/// `carry` so the caller can feed it back on its next turn instead of
/// reading the link again.
pub fn frame_sentence(buf: &mut Vec<u8>, carry: &mut Vec<u8>) -> Result<Sentence, FrameError> {
    let (line_len, rest) = {
        let (line, rest) = split_frame(buf);
        (line.len(), rest.map(|r| r.to_vec()))
    };
    carry.clear();
    if let Some(rest) = rest {
        carry.extend_from_slice(&rest);
    }
    buf.truncate(line_len);
    validate(buf)
}

/// Verify the `*HH` trailer of a single line and wrap it as a [`Sentence`].
pub fn validate(line: &[u8]) -> Result<Sentence, FrameError> {
    let line = trim_nul(line);
    if line.is_empty() {
        return Err(FrameError::Empty);
    }

    // Skip any line noise in front of the start marker
    let start = line
        .iter()
        .position(|b| is_start_marker(*b))
        .map(|p| p + 1)
        .unwrap_or(0);
    if !line[start..].is_ascii() {
        return Err(FrameError::NotAscii);
    }
    let star = line[start..]
        .iter()
        .position(|b| *b == b'*')
        .map(|p| start + p)
        .ok_or(FrameError::NoChecksum)?;

    let body = &line[start..star];
    let expected = parse_hex_pair(&line[star + 1..]).ok_or(FrameError::NoChecksum)?;
    let computed = checksum(body);
    if expected != computed {
        return Err(FrameError::ChecksumInvalid { expected, computed });
    }

    // ASCII was checked above, so this cannot fail
    let body = std::str::from_utf8(body).map_err(|_| FrameError::NotAscii)?;
    Ok(Sentence::new(body))
}

/// Append a checksum trailer to a sentence body, e.g. for replaying or tests.
pub fn with_checksum(sentence: &str) -> String {
    let body = sentence.trim_start_matches(['$', '!']);
    let marker = if sentence.starts_with('!') { '!' } else { '$' };
    format!("{}{}*{:02X}", marker, body, checksum(body.as_bytes()))
}

fn parse_hex_pair(digits: &[u8]) -> Option<u8> {
    let pair = digits.get(..2)?;
    if !pair.iter().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let text = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(text, 16).ok()
}

fn trim_nul(line: &[u8]) -> &[u8] {
    let end = line.iter().position(|b| *b == 0).unwrap_or(line.len());
    &line[..end]
}

/// Streaming front end over [`frame_sentence`].
///
/// Owns the carry-over buffer for one link. Complete lines come out in
/// arrival order; a trailing fragment stays buffered until its terminator
/// shows up in a later read.
#[derive(Debug, Default)]
pub struct SentenceFramer {
    pending: Vec<u8>,
    dropped_bytes: u64,
}

impl SentenceFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING {
            // No terminator in sight, this is not a sentence stream we can use
            self.dropped_bytes += self.pending.len() as u64;
            log::debug!("Dropping {} unterminated bytes", self.pending.len());
            self.pending.clear();
        }
    }

    /// Pop the next complete line, validated.
    ///
    /// Returns `None` once only an unterminated fragment (or nothing) is left.
    pub fn next_sentence(&mut self) -> Option<Result<Sentence, FrameError>> {
        loop {
            if !self.pending.iter().any(|b| is_terminator(*b)) {
                return None;
            }
            let mut buf = std::mem::take(&mut self.pending);
            let mut carry = Vec::new();
            let result = frame_sentence(&mut buf, &mut carry);
            self.pending = carry;
            match result {
                // Blank lines between sentences are not worth reporting
                Err(FrameError::Empty) => continue,
                other => return Some(other),
            }
        }
    }

    /// Bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    #[test]
    fn test_known_rmc_checksum() {
        let sentence = validate(RMC.as_bytes()).unwrap();
        assert_eq!(sentence.kind(), "RMC");
        assert_eq!(sentence.field(7), "022.4");
        assert_eq!(sentence.field(1), "123519");
    }

    #[test]
    fn test_lowercase_checksum_digits() {
        let lower = RMC.replace("*6A", "*6a");
        assert!(validate(lower.as_bytes()).is_ok());
    }

    #[test]
    fn test_any_flipped_payload_byte_fails() {
        let bytes = RMC.as_bytes();
        let star = RMC.find('*').unwrap();
        for i in 1..star {
            let mut corrupt = bytes.to_vec();
            corrupt[i] ^= 0x01;
            assert!(
                validate(&corrupt).is_err(),
                "flip at {} slipped through: {}",
                i,
                String::from_utf8_lossy(&corrupt)
            );
        }
    }

    #[test]
    fn test_missing_marker_rejected() {
        let bare = "$GPRMC,123519,A,4807.038,N";
        assert_eq!(validate(bare.as_bytes()), Err(FrameError::NoChecksum));
        assert_eq!(
            validate(b"$GPHDT,123.4,T*"),
            Err(FrameError::NoChecksum)
        );
    }

    #[test]
    fn test_single_checksum_digit_rejected() {
        // Checksum is 0x07, so a lone `7` would match if one digit were enough
        let body = "GPHDT,10.3,T";
        assert_eq!(checksum(body.as_bytes()) & 0xF0, 0x00);
        let short = format!("${}*{:X}", body, checksum(body.as_bytes()));
        assert_eq!(validate(short.as_bytes()), Err(FrameError::NoChecksum));
        assert!(validate(with_checksum(body).as_bytes()).is_ok());
    }

    #[test]
    fn test_wrong_checksum_reports_both_values() {
        let bad = RMC.replace("*6A", "*00");
        match validate(bad.as_bytes()) {
            Err(FrameError::ChecksumInvalid { expected, computed }) => {
                assert_eq!(expected, 0x00);
                assert_eq!(computed, 0x6A);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_leading_noise_is_skipped() {
        let noisy = format!("\u{1}xx{}", with_checksum("$IIMTW,18.5,C"));
        let sentence = validate(noisy.as_bytes()).unwrap();
        assert_eq!(sentence.kind(), "MTW");
    }

    #[test]
    fn test_non_ascii_noise_before_marker_is_skipped() {
        let mut noisy = vec![0xFF, 0xFE, 0x80];
        noisy.extend_from_slice(RMC.as_bytes());
        assert_eq!(validate(&noisy).unwrap().kind(), "RMC");

        let mut corrupt = RMC.as_bytes().to_vec();
        corrupt[10] = 0xB0;
        assert_eq!(validate(&corrupt), Err(FrameError::NotAscii));
    }

    #[test]
    fn test_frame_sentence_moves_remainder_to_carry() {
        let first = with_checksum("$IIDBT,12.1,f,3.7,M,2.0,F");
        let second = with_checksum("$IIMTW,18.5,C");
        let mut buf = format!("{}\r\n{}\r\n", first, second).into_bytes();
        let mut carry = Vec::new();

        let sentence = frame_sentence(&mut buf, &mut carry).unwrap();
        assert_eq!(sentence.kind(), "DBT");
        assert_eq!(buf, first.as_bytes());
        assert_eq!(carry, format!("{}\r\n", second).into_bytes());

        let mut next = std::mem::take(&mut carry);
        let sentence = frame_sentence(&mut next, &mut carry).unwrap();
        assert_eq!(sentence.kind(), "MTW");
        assert!(carry.is_empty());
    }

    #[test]
    fn test_framer_holds_partial_sentence() {
        let full = format!("{}\r\n", with_checksum("$IIVHW,,T,,M,5.2,N,9.6,K"));
        let (a, b) = full.split_at(10);
        let mut framer = SentenceFramer::new();

        framer.push(a.as_bytes());
        assert!(framer.next_sentence().is_none());
        assert_eq!(framer.pending_len(), 10);

        framer.push(b.as_bytes());
        let sentence = framer.next_sentence().unwrap().unwrap();
        assert_eq!(sentence.kind(), "VHW");
        assert!(framer.next_sentence().is_none());
    }

    #[test]
    fn test_framer_yields_each_sentence_of_one_read() {
        let read = format!(
            "{}\r\n{}\r\n$GPGLL,4916.45,N,12311.12,W*00\r\n{}\n",
            with_checksum("$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K"),
            with_checksum("$GPHDT,274.07,T"),
            with_checksum("$IIMTW,18.5,C"),
        );
        let mut framer = SentenceFramer::new();
        framer.push(read.as_bytes());

        let kinds: Vec<Result<String, FrameError>> = std::iter::from_fn(|| framer.next_sentence())
            .map(|r| r.map(|s| s.kind().to_string()))
            .collect();
        assert_eq!(kinds.len(), 4);
        assert_eq!(kinds[0].as_deref(), Ok("VTG"));
        assert_eq!(kinds[1].as_deref(), Ok("HDT"));
        assert!(kinds[2].is_err());
        assert_eq!(kinds[3].as_deref(), Ok("MTW"));
    }

    #[test]
    fn test_framer_discards_runaway_fragment() {
        let mut framer = SentenceFramer::new();
        framer.push(&vec![b'A'; MAX_PENDING + 1]);
        assert_eq!(framer.pending_len(), 0);
        assert_eq!(framer.dropped_bytes(), (MAX_PENDING + 1) as u64);
    }

    #[test]
    fn test_with_checksum_round_trips() {
        let line = with_checksum("!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0");
        assert!(line.starts_with('!'));
        assert!(validate(line.as_bytes()).is_ok());
    }
}
