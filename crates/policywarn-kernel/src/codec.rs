//! Persistence codec for a user's resolved-service set.
//!
//! The set is stored as one comma-delimited string of short service
//! identifiers in sorted order, so equal sets always encode identically.
//! The empty set encodes to the empty string.
//!
//! Identifiers are escaped before joining: `\` becomes `\\` and `,` becomes
//! `\,`. Decoding is fail-soft: empty or malformed entries are skipped.
//!
//! ```
//! use std::collections::BTreeSet;
//! use policywarn_kernel::codec;
//! use policywarn_types::ServiceId;
//!
//! let mut set = BTreeSet::new();
//! set.insert(ServiceId::parse("com.b/.Svc").unwrap());
//! set.insert(ServiceId::parse("com.a/.Svc").unwrap());
//!
//! assert_eq!(codec::encode(&set), "com.a/.Svc,com.b/.Svc");
//! assert_eq!(codec::decode("com.a/.Svc,com.b/.Svc"), set);
//! ```

use std::collections::BTreeSet;

use policywarn_types::ServiceId;
use tracing::debug;

/// Separator between encoded identifiers.
pub const DELIMITER: char = ',';
const ESCAPE: char = '\\';

/// Encode `services` into the persisted string form.
pub fn encode(services: &BTreeSet<ServiceId>) -> String {
    let mut out = String::new();
    for (i, service) in services.iter().enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        for c in service.to_short_string().chars() {
            if c == DELIMITER || c == ESCAPE {
                out.push(ESCAPE);
            }
            out.push(c);
        }
    }
    out
}

/// Decode a persisted string back into a set.
pub fn decode(raw: &str) -> BTreeSet<ServiceId> {
    let mut services = BTreeSet::new();
    let mut segment = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(next) => segment.push(next),
                // Dangling escape at end of input is kept literally.
                None => segment.push(ESCAPE),
            },
            DELIMITER => push_segment(&mut services, &mut segment),
            _ => segment.push(c),
        }
    }
    push_segment(&mut services, &mut segment);
    services
}

fn push_segment(services: &mut BTreeSet<ServiceId>, segment: &mut String) {
    if segment.is_empty() {
        return;
    }
    match ServiceId::parse(segment) {
        Some(id) => {
            services.insert(id);
        }
        None => debug!(entry = %segment, "skipping malformed persisted service entry"),
    }
    segment.clear();
}
