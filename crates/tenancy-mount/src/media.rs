//! Media types and Accept-style hints

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::MountError;

/// A `type/subtype` media type, lowercased, without parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaType {
    essence: Cow<'static, str>,
}

impl MediaType {
    pub const JSON: MediaType = MediaType::constant("application/json");
    pub const HTML: MediaType = MediaType::constant("text/html");
    pub const TEXT: MediaType = MediaType::constant("text/plain");
    pub const ANY: MediaType = MediaType::constant("*/*");

    const fn constant(essence: &'static str) -> Self {
        Self {
            essence: Cow::Borrowed(essence),
        }
    }

    /// Parse one media type, dropping parameters such as `charset`.
    pub fn parse(value: &str) -> Result<Self, MountError> {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.split_once('/') {
            Some((kind, sub)) if !kind.is_empty() && !sub.is_empty() && !sub.contains('/') => {
                Ok(Self {
                    essence: Cow::Owned(essence),
                })
            }
            _ => Err(MountError::InvalidMediaType(value.to_string())),
        }
    }

    /// Parse an Accept-style list into media types, most preferred first.
    ///
    /// Entries are ordered by their `q` weight (default 1), keeping the
    /// listed order among equal weights. Malformed entries and entries with
    /// `q=0` are dropped.
    pub fn parse_accept(hint: &str) -> Vec<MediaType> {
        let mut weighted: Vec<(f32, MediaType)> = hint
            .split(',')
            .filter_map(|entry| {
                let media_type = MediaType::parse(entry).ok()?;
                let weight = entry
                    .split(';')
                    .skip(1)
                    .filter_map(|param| param.split_once('='))
                    .find(|(key, _)| key.trim().eq_ignore_ascii_case("q"))
                    .map_or(Some(1.0), |(_, q)| q.trim().parse::<f32>().ok())?;
                (weight > 0.0).then_some((weight, media_type))
            })
            .collect();

        weighted.sort_by(|a, b| b.0.total_cmp(&a.0));
        weighted.into_iter().map(|(_, media_type)| media_type).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.essence
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.essence)
    }
}

impl FromStr for MediaType {
    type Err = MountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
