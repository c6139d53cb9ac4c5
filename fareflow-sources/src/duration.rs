/// Minutes in an ISO-8601 duration such as `PT2H35M` or `P1DT3H`.
/// Seconds are rounded up to the next minute. Returns None on malformed input.
pub fn parse_iso8601_minutes(value: &str) -> Option<u32> {
    let value = value.trim();
    let rest = value.strip_prefix('P').or_else(|| value.strip_prefix('p'))?;
    if rest.is_empty() {
        return None;
    }

    let (date_part, time_part) = match rest.find(['T', 't']) {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    };

    let mut total_seconds: u64 = 0;
    let mut saw_component = false;

    for (number, unit) in components(date_part)? {
        let factor = match unit {
            'D' => 86_400,
            'W' => 7 * 86_400,
            _ => return None,
        };
        total_seconds = number.checked_mul(factor)?.checked_add(total_seconds)?;
        saw_component = true;
    }

    if let Some(time_part) = time_part {
        if time_part.is_empty() {
            return None;
        }
        for (number, unit) in components(time_part)? {
            let factor = match unit {
                'H' => 3_600,
                'M' => 60,
                'S' => 1,
                _ => return None,
            };
            total_seconds = number.checked_mul(factor)?.checked_add(total_seconds)?;
            saw_component = true;
        }
    }

    if !saw_component {
        return None;
    }
    u32::try_from(total_seconds.div_ceil(60)).ok()
}

fn components(part: &str) -> Option<Vec<(u64, char)>> {
    let mut out = Vec::new();
    let mut digits = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if digits.is_empty() {
                return None;
            }
            out.push((digits.parse().ok()?, c.to_ascii_uppercase()));
            digits.clear();
        }
    }
    if !digits.is_empty() {
        return None;
    }
    Some(out)
}
