//! Freshness tokens for cached pipeline output.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Outcome of a freshness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidityVerdict {
    Valid,
    Invalid,
    /// The token cannot decide on its own; compare it with a fresh one.
    Unknown,
}

/// Per-stage freshness token stored next to cached output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    /// Output never changes.
    Nop,
    /// Last-modified time of the source in milliseconds since the epoch.
    TimeStamp(i64),
    /// Output stays fresh until the given instant.
    Expires(OffsetDateTime),
    /// Hex digest of the source content.
    Digest(String),
    Aggregated(AggregatedValidity),
}

impl Validity {
    pub fn timestamp(when: OffsetDateTime) -> Self {
        // Clamps to the `i64` millisecond range.
        let millis = when.unix_timestamp_nanos() / 1_000_000;
        let millis = i64::try_from(millis).unwrap_or(if millis < 0 { i64::MIN } else { i64::MAX });
        Self::TimeStamp(millis)
    }

    /// Digest validity over raw content bytes.
    pub fn digest_of(content: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_ref());
        Self::Digest(hex::encode(hasher.finalize()))
    }

    /// Cheap self-check without consulting the source.
    pub fn is_valid(&self) -> ValidityVerdict {
        match self {
            Validity::Nop => ValidityVerdict::Valid,
            Validity::TimeStamp(_) | Validity::Digest(_) => ValidityVerdict::Unknown,
            Validity::Expires(until) => {
                if OffsetDateTime::now_utc() < *until {
                    ValidityVerdict::Valid
                } else {
                    ValidityVerdict::Invalid
                }
            }
            Validity::Aggregated(aggregated) => aggregated.is_valid(),
        }
    }

    /// Compare against a freshly obtained token from the same source.
    ///
    /// Tokens of a different kind never match.
    pub fn is_valid_against(&self, fresh: &Validity) -> ValidityVerdict {
        match (self, fresh) {
            (Validity::Nop, Validity::Nop) => ValidityVerdict::Valid,
            (Validity::TimeStamp(cached), Validity::TimeStamp(current)) => {
                verdict(cached == current)
            }
            (Validity::Digest(cached), Validity::Digest(current)) => verdict(cached == current),
            (Validity::Expires(_), Validity::Expires(_)) => match self.is_valid() {
                ValidityVerdict::Valid => ValidityVerdict::Valid,
                _ => ValidityVerdict::Invalid,
            },
            (Validity::Aggregated(cached), Validity::Aggregated(current)) => {
                cached.is_valid_against(current)
            }
            _ => ValidityVerdict::Invalid,
        }
    }
}

fn verdict(valid: bool) -> ValidityVerdict {
    if valid {
        ValidityVerdict::Valid
    } else {
        ValidityVerdict::Invalid
    }
}

/// Ordered composite of child validities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedValidity {
    children: Vec<Validity>,
}

impl AggregatedValidity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, validity: Validity) {
        self.children.push(validity);
    }

    pub fn children(&self) -> &[Validity] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// VALID iff every child is VALID; INVALID as soon as one child is;
    /// UNKNOWN otherwise.
    pub fn is_valid(&self) -> ValidityVerdict {
        let mut unknown = false;
        for child in &self.children {
            match child.is_valid() {
                ValidityVerdict::Valid => {}
                ValidityVerdict::Invalid => return ValidityVerdict::Invalid,
                ValidityVerdict::Unknown => unknown = true,
            }
        }
        if unknown {
            ValidityVerdict::Unknown
        } else {
            ValidityVerdict::Valid
        }
    }

    /// Resolve every child against its fresh counterpart at the same position.
    pub fn is_valid_against(&self, fresh: &AggregatedValidity) -> ValidityVerdict {
        if self.children.len() != fresh.children.len() {
            return ValidityVerdict::Invalid;
        }
        for (cached, current) in self.children.iter().zip(&fresh.children) {
            let resolved = match cached.is_valid() {
                ValidityVerdict::Valid => ValidityVerdict::Valid,
                ValidityVerdict::Invalid => return ValidityVerdict::Invalid,
                ValidityVerdict::Unknown => cached.is_valid_against(current),
            };
            if resolved != ValidityVerdict::Valid {
                return ValidityVerdict::Invalid;
            }
        }
        ValidityVerdict::Valid
    }
}

impl FromIterator<Validity> for AggregatedValidity {
    fn from_iter<I: IntoIterator<Item = Validity>>(iter: I) -> Self {
        Self {
            children: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn expired() -> Validity {
        Validity::Expires(OffsetDateTime::now_utc() - Duration::hours(1))
    }

    fn fresh_expiry() -> Validity {
        Validity::Expires(OffsetDateTime::now_utc() + Duration::hours(1))
    }

    #[test]
    fn timestamp_is_milliseconds_since_epoch() {
        let when = OffsetDateTime::UNIX_EPOCH + Duration::milliseconds(1_500);
        assert_eq!(Validity::timestamp(when), Validity::TimeStamp(1_500));

        let before = OffsetDateTime::UNIX_EPOCH - Duration::milliseconds(2_250);
        assert_eq!(Validity::timestamp(before), Validity::TimeStamp(-2_250));
    }

    #[test]
    fn timestamp_covers_the_calendar_range() {
        let Validity::TimeStamp(max) = Validity::timestamp(time::PrimitiveDateTime::MAX.assume_utc())
        else {
            panic!("timestamp validity");
        };
        let Validity::TimeStamp(min) = Validity::timestamp(time::PrimitiveDateTime::MIN.assume_utc())
        else {
            panic!("timestamp validity");
        };
        assert!(max > 0 && max < i64::MAX);
        assert!(min < 0 && min > i64::MIN);
    }

    #[test]
    fn aggregate_of_valid_children_is_valid() {
        let aggregated: AggregatedValidity =
            [Validity::Nop, fresh_expiry(), Validity::Nop].into_iter().collect();
        assert_eq!(aggregated.is_valid(), ValidityVerdict::Valid);
    }

    #[test]
    fn one_invalid_child_invalidates_aggregate() {
        for position in 0..3 {
            let mut aggregated = AggregatedValidity::new();
            for index in 0..3 {
                if index == position {
                    aggregated.add(expired());
                } else {
                    aggregated.add(Validity::TimeStamp(10));
                }
            }
            assert_eq!(aggregated.is_valid(), ValidityVerdict::Invalid);
        }
    }

    #[test]
    fn unknown_child_makes_aggregate_unknown_until_resolved() {
        let cached: AggregatedValidity = [Validity::Nop, Validity::TimeStamp(100)]
            .into_iter()
            .collect();
        assert_eq!(cached.is_valid(), ValidityVerdict::Unknown);

        let same: AggregatedValidity = [Validity::Nop, Validity::TimeStamp(100)]
            .into_iter()
            .collect();
        assert_eq!(cached.is_valid_against(&same), ValidityVerdict::Valid);

        let newer: AggregatedValidity = [Validity::Nop, Validity::TimeStamp(200)]
            .into_iter()
            .collect();
        assert_eq!(cached.is_valid_against(&newer), ValidityVerdict::Invalid);
    }

    #[test]
    fn aggregate_comparison_requires_matching_shape() {
        let cached: AggregatedValidity = [Validity::TimeStamp(1)].into_iter().collect();
        let fresh: AggregatedValidity = [Validity::TimeStamp(1), Validity::Nop]
            .into_iter()
            .collect();
        assert_eq!(cached.is_valid_against(&fresh), ValidityVerdict::Invalid);
    }

    #[test]
    fn empty_aggregate_is_valid() {
        assert_eq!(AggregatedValidity::new().is_valid(), ValidityVerdict::Valid);
    }

    #[test]
    fn digest_validity_compares_content() {
        let cached = Validity::digest_of("hello");
        assert_eq!(cached.is_valid(), ValidityVerdict::Unknown);
        assert_eq!(
            cached.is_valid_against(&Validity::digest_of("hello")),
            ValidityVerdict::Valid
        );
        assert_eq!(
            cached.is_valid_against(&Validity::digest_of("changed")),
            ValidityVerdict::Invalid
        );
    }

    #[test]
    fn mismatched_kinds_never_match() {
        assert_eq!(
            Validity::TimeStamp(1).is_valid_against(&Validity::Nop),
            ValidityVerdict::Invalid
        );
    }

    #[test]
    fn expires_follows_clock() {
        assert_eq!(fresh_expiry().is_valid(), ValidityVerdict::Valid);
        assert_eq!(expired().is_valid(), ValidityVerdict::Invalid);
    }

    #[test]
    fn timestamp_constructor_uses_millis() {
        let when = OffsetDateTime::from_unix_timestamp(2).expect("valid timestamp");
        assert_eq!(Validity::timestamp(when), Validity::TimeStamp(2000));
    }
}
