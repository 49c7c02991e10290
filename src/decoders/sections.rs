//! Raw GRIB2 section walk for the time and grid metadata the field decoder
//! does not hand back.
//!
//! Every section after the 16-byte indicator starts with a 4-byte length and
//! a 1-byte section number; the message ends with `7777`. Each product
//! definition (section 4) starts a submessage that uses the latest
//! identification (section 1) and grid definition (section 3).

use chrono::{DateTime, Duration, TimeZone, Utc};

const INDICATOR_LEN: usize = 16;
const END_MARKER: &[u8] = b"7777";

/// Time and grid facts for one submessage, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmessageInfo {
    pub grid_template: Option<u16>,
    pub reference_time: Option<DateTime<Utc>>,
    pub step_hours: Option<u32>,
    pub valid_time: Option<DateTime<Utc>>,
}

/// Scan every message in `buffer`. Never fails: a truncated or malformed
/// message ends the scan and keeps what was read before it.
pub fn scan_submessages(buffer: &[u8]) -> Vec<SubmessageInfo> {
    let mut infos = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_magic(buffer, pos) {
        let Some(total) = read_u64(buffer, start + 8) else {
            break;
        };
        let total = usize::try_from(total).unwrap_or(usize::MAX);
        if total < INDICATOR_LEN {
            break;
        }
        let end = start.saturating_add(total).min(buffer.len());

        scan_message(&buffer[start..end], &mut infos);
        pos = end;
    }

    infos
}

fn find_magic(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(4)
        .position(|w| w == b"GRIB")
        .map(|offset| from + offset)
}

fn scan_message(message: &[u8], infos: &mut Vec<SubmessageInfo>) {
    let mut reference_time = None;
    let mut grid_template = None;
    let mut pos = INDICATOR_LEN;

    while pos < message.len() {
        if message[pos..].starts_with(END_MARKER) {
            break;
        }
        let Some(len) = read_u32(message, pos).map(|l| l as usize) else {
            break;
        };
        if len < 5 || pos + len > message.len() {
            break;
        }
        let section = &message[pos..pos + len];

        match section[4] {
            1 => reference_time = datetime_at(section, 12),
            3 => grid_template = read_u16(section, 12),
            4 => infos.push(product_info(section, reference_time, grid_template)),
            _ => {}
        }
        pos += len;
    }
}

fn product_info(
    section: &[u8],
    reference_time: Option<DateTime<Utc>>,
    grid_template: Option<u16>,
) -> SubmessageInfo {
    let mut info = SubmessageInfo {
        grid_template,
        reference_time,
        ..Default::default()
    };
    let Some(reference) = reference_time else {
        return info;
    };

    // Statistically processed products are valid at the end of their interval
    let interval_end = read_u16(section, 7)
        .and_then(interval_end_offset)
        .and_then(|at| datetime_at(section, at));

    let lead = match interval_end {
        Some(end) => Some(end - reference),
        None => match (section.get(17), read_u32(section, 18)) {
            (Some(&unit), Some(value)) => lead_time(unit, value),
            _ => None,
        },
    };

    if let Some(lead) = lead {
        info.valid_time = Some(reference + lead);
        info.step_hours = whole_hours(lead);
    }
    info
}

/// Offset of the overall interval end time within section 4, by product
/// template.
fn interval_end_offset(template: u16) -> Option<usize> {
    match template {
        8 => Some(34),
        9 => Some(47),
        10 => Some(35),
        11 => Some(37),
        12 => Some(36),
        _ => None,
    }
}

/// Code table 4.4
fn lead_time(unit: u8, value: u32) -> Option<Duration> {
    let value = i64::from(value);
    match unit {
        0 => Some(Duration::minutes(value)),
        1 => Some(Duration::hours(value)),
        2 => Some(Duration::days(value)),
        10 => Some(Duration::hours(3 * value)),
        11 => Some(Duration::hours(6 * value)),
        12 => Some(Duration::hours(12 * value)),
        13 => Some(Duration::seconds(value)),
        _ => None,
    }
}

fn whole_hours(lead: Duration) -> Option<u32> {
    let seconds = lead.num_seconds();
    if seconds < 0 || seconds % 3600 != 0 {
        return None;
    }
    u32::try_from(seconds / 3600).ok()
}

fn datetime_at(section: &[u8], at: usize) -> Option<DateTime<Utc>> {
    let year = read_u16(section, at)?;
    let parts = section.get(at + 2..at + 7)?;
    Utc.with_ymd_and_hms(
        i32::from(year),
        u32::from(parts[0]),
        u32::from(parts[1]),
        u32::from(parts[2]),
        u32::from(parts[3]),
        u32::from(parts[4]),
    )
    .single()
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], at: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
