//! Distinguished name helpers (RFC 4514).

/// Escape an attribute value for use inside a DN.
///
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
pub fn escape_dn_value(value: &str) -> String {
    let count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Attribute/value pairs of the leaf (left-most) RDN, values unescaped.
///
/// Multi-valued RDNs (`cn=Ivan+uid=ivan`) yield one pair per assertion.
pub fn leaf_rdn(dn: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut attr = String::new();
    let mut value: Vec<u8> = Vec::new();
    let mut in_value = false;
    let mut chars = dn.trim_start().chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if in_value => {
                let first = chars.next();
                let second = chars.peek().copied();
                match (first, second) {
                    (Some(hi), Some(lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                        chars.next();
                        let byte = (hi.to_digit(16).unwrap_or(0) * 16 + lo.to_digit(16).unwrap_or(0)) as u8;
                        value.push(byte);
                    }
                    (Some(escaped), _) => push_char(&mut value, escaped),
                    (None, _) => {}
                }
            }
            '=' if !in_value => in_value = true,
            ',' | ';' if in_value => break,
            '+' if in_value => {
                push_pair(&mut pairs, &attr, &value);
                attr.clear();
                value.clear();
                in_value = false;
            }
            _ if in_value => push_char(&mut value, ch),
            _ => attr.push(ch),
        }
    }
    if in_value {
        push_pair(&mut pairs, &attr, &value);
    }
    pairs
}

/// Value of `attribute` in the leaf RDN, if the leaf names it.
pub fn leaf_value(dn: &str, attribute: &str) -> Option<String> {
    leaf_rdn(dn)
        .into_iter()
        .find(|(attr, _)| attr.eq_ignore_ascii_case(attribute))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

fn push_char(buf: &mut Vec<u8>, ch: char) {
    let mut tmp = [0u8; 4];
    buf.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
}

fn push_pair(pairs: &mut Vec<(String, String)>, attr: &str, value: &[u8]) {
    let attr = attr.trim();
    if attr.is_empty() {
        return;
    }
    let value = String::from_utf8_lossy(value);
    pairs.push((attr.to_string(), value.trim().to_string()));
}
