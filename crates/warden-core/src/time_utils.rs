/// Returns the current Unix timestamp in milliseconds. Used as a cheap
/// monotonic-enough nonce for modal custom ids.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_ms_is_on_the_unix_millisecond_scale() {
        let now_ms = current_unix_timestamp_ms();
        // Well past 2020-01-01 and well short of the saturation value.
        assert!(now_ms > 1_577_836_800_000);
        assert!(now_ms < u64::MAX);
    }
}
