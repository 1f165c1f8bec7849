use chrono::Utc;
use rand::Rng;

/// `[0-9a-zA-Z]` without `l`, `o`, `I` and `O`.
const ALPHABET: &[u8] = b"0123456789abcdefghijkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";
const PREFIX_LEN: usize = 8;

/// Time-prefixed identifier: the current UNIX time in milliseconds encoded in
/// the alphabet above (left-padded to 8 characters), followed by
/// `random_len` random characters.
pub fn cuuid(random_len: usize) -> String {
    cuuid_at(Utc::now().timestamp_millis().max(0) as u64, random_len)
}

pub(crate) fn cuuid_at(millis: u64, random_len: usize) -> String {
    let base = ALPHABET.len() as u64;
    let mut prefix = Vec::with_capacity(PREFIX_LEN);
    let mut num = millis;
    while num > 0 {
        prefix.push(ALPHABET[(num % base) as usize]);
        num /= base;
    }
    while prefix.len() < PREFIX_LEN {
        prefix.push(ALPHABET[0]);
    }
    prefix.reverse();

    let mut rng = rand::thread_rng();
    let mut out = String::from_utf8_lossy(&prefix).into_owned();
    for _ in 0..random_len {
        out.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuuid_length_and_alphabet() {
        let id = cuuid(24);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!id.contains(['l', 'o', 'I', 'O']));
    }

    #[test]
    fn test_prefix_is_padded_timestamp() {
        assert_eq!(cuuid_at(0, 0), "00000000");
        assert_eq!(cuuid_at(57, 0), "0000000Z");
        assert_eq!(cuuid_at(58, 0), "00000010");
        let id = cuuid_at(1_700_000_000_000, 4);
        assert_eq!(id.len(), 12);
        assert!(id.starts_with(&cuuid_at(1_700_000_000_000, 0)));
    }

    #[test]
    fn test_prefixes_sort_by_time() {
        let earlier = cuuid_at(1_600_000_000_000, 0);
        let later = cuuid_at(1_600_000_000_001, 0);
        assert_ne!(earlier, later);
    }
}
