use mailparse::{parse_header, parse_headers};

/// Splits a raw header block into `(name, value)` pairs with RFC 2047 encoded
/// words decoded. Falls back to line-by-line decoding when the block is not
/// well formed.
pub fn decode_header_block(raw: &[u8]) -> Vec<(String, String)> {
    match parse_headers(raw) {
        Ok((headers, _)) => headers
            .iter()
            .map(|header| (header.get_key(), header.get_value()))
            .collect(),
        Err(err) => {
            tracing::debug!(error = %err, "header block not well formed, decoding line by line");
            String::from_utf8_lossy(raw)
                .split(|c: char| c == '\r' || c == '\n')
                .filter(|line| !line.trim().is_empty())
                .filter_map(|line| {
                    let decoded = decode_header_line(line);
                    let (name, value) = decoded.split_once(':')?;
                    Some((name.trim().to_string(), value.trim().to_string()))
                })
                .collect()
        }
    }
}

/// Decodes a single `Name: value` line. Lines that are not headers come back
/// unchanged.
pub fn decode_header_line(line: &str) -> String {
    match parse_header(line.as_bytes()) {
        Ok((header, _)) if !header.get_key_ref().trim().is_empty() => {
            format!("{}: {}", header.get_key(), header.get_value())
        }
        _ => line.to_string(),
    }
}
