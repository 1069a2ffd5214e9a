use getrandom::getrandom;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const LAUNCH_SUFFIX_WIDTH: usize = 6;
const LAUNCH_SUFFIX_SPACE: u32 = 36u32.pow(LAUNCH_SUFFIX_WIDTH as u32);

pub const LAUNCH_ID_PREFIX: &str = "launch";

// Ids become file names, so separators and leading dots are refused.
pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value.starts_with('.') {
        return Err(format!("{kind} must not start with '.'"));
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
    {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-', '_' or '.'"
    ))
}

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.into_iter().rev().collect()
}

fn base36_encode_fixed_u32(mut value: u32, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}

pub fn generate_launch_id(now_millis: i64) -> Result<String, String> {
    let timestamp = u64::try_from(now_millis)
        .map_err(|_| "launch id requires a non-negative timestamp".to_string())?;
    let mut bytes = [0_u8; 4];
    getrandom(&mut bytes)
        .map_err(|err| format!("failed to generate launch id randomness: {err}"))?;
    let sample = u32::from_le_bytes(bytes) % LAUNCH_SUFFIX_SPACE;
    Ok(format!(
        "{LAUNCH_ID_PREFIX}-{}-{}",
        base36_encode_u64(timestamp),
        base36_encode_fixed_u32(sample, LAUNCH_SUFFIX_WIDTH)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_ids_are_prefixed_and_valid_file_names() {
        let id = generate_launch_id(1_700_000_000_000).expect("id");
        assert!(id.starts_with("launch-"));
        assert_eq!(id.rsplit('-').next().map(str::len), Some(LAUNCH_SUFFIX_WIDTH));
        validate_identifier_value("launch id", &id).expect("valid");
    }

    #[test]
    fn identifiers_reject_path_escapes() {
        assert!(validate_identifier_value("thread id", "../etc").is_err());
        assert!(validate_identifier_value("thread id", "a/b").is_err());
        assert!(validate_identifier_value("thread id", "").is_err());
        assert!(validate_identifier_value("thread id", "019a-thread.1").is_ok());
    }
}
