//! Language selection state
//!
//! The appliance supports a fixed language list. The Target button cycles
//! the user's language over the whole list; the Source button cycles the
//! guest's language over the list *excluding* the current target, so the
//! pair can only collide when the target is cycled onto the source. Each
//! successful cycle names a pre-recorded confirmation clip.

use serde::{Deserialize, Serialize};

use crate::button::RecordingChannel;

/// Supported languages, in cycling order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageCode {
    En,
    De,
    Zh,
}

impl LanguageCode {
    pub const ALL: [LanguageCode; 3] = [LanguageCode::En, LanguageCode::De, LanguageCode::Zh];

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageCode::En => "en",
            LanguageCode::De => "de",
            LanguageCode::Zh => "zh",
        }
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the translation a language button adjusts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageRole {
    Source,
    Target,
}

/// Identifier of a pre-recorded or synthesized audio clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipId(pub String);

impl ClipId {
    /// Startup greeting announcing the default language pair
    pub fn default_greeting() -> Self {
        ClipId("default".to_string())
    }

    /// Played when the user channel is asked to record with source == target
    pub fn error() -> Self {
        ClipId("error".to_string())
    }
}

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current source/target pair with cycling behavior
#[derive(Debug, Clone)]
pub struct LanguageSelection {
    source: LanguageCode,
    target: LanguageCode,
}

impl LanguageSelection {
    pub fn new(source: LanguageCode, target: LanguageCode) -> Self {
        Self { source, target }
    }

    pub fn source(&self) -> LanguageCode {
        self.source
    }

    pub fn target(&self) -> LanguageCode {
        self.target
    }

    /// Advance the target language one step, wrapping over the full list.
    /// Returns the new target and its confirmation clip (`t_<target>`).
    pub fn cycle_target(&mut self) -> (LanguageCode, ClipId) {
        let idx = LanguageCode::ALL
            .iter()
            .position(|&c| c == self.target)
            .unwrap_or(0);
        self.target = LanguageCode::ALL[(idx + 1) % LanguageCode::ALL.len()];
        let clip = ClipId(format!("t_{}", self.target));
        (self.target, clip)
    }

    /// Advance the source language one step over the list excluding the
    /// current target. If the target was previously cycled onto the source,
    /// the source first snaps to the first available code before advancing.
    /// Returns the new source and the pair confirmation clip
    /// (`<target>_<source>`).
    pub fn cycle_source(&mut self) -> (LanguageCode, ClipId) {
        let available: Vec<LanguageCode> = LanguageCode::ALL
            .iter()
            .copied()
            .filter(|&c| c != self.target)
            .collect();

        let current = if available.contains(&self.source) {
            self.source
        } else {
            available[0]
        };
        let idx = available
            .iter()
            .position(|&c| c == current)
            .unwrap_or(0);
        self.source = available[(idx + 1) % available.len()];

        let clip = ClipId(format!("{}_{}", self.target, self.source));
        (self.source, clip)
    }

    /// Translation direction for a recording channel. The guest speaks the
    /// source language; the user speaks the target language, so the user
    /// channel translates in the reverse direction.
    pub fn direction(&self, channel: RecordingChannel) -> (LanguageCode, LanguageCode) {
        match channel {
            RecordingChannel::Guest => (self.source, self.target),
            RecordingChannel::User => (self.target, self.source),
        }
    }

    /// True when both sides are the same language and translation would be
    /// a no-op (reachable only by cycling the target onto the source)
    pub fn is_degenerate(&self) -> bool {
        self.source == self.target
    }
}

impl Default for LanguageSelection {
    /// Factory defaults: guest speaks English, user speaks German
    fn default() -> Self {
        Self::new(LanguageCode::En, LanguageCode::De)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pair() {
        let sel = LanguageSelection::default();
        assert_eq!(sel.source(), LanguageCode::En);
        assert_eq!(sel.target(), LanguageCode::De);
        assert!(!sel.is_degenerate());
    }

    #[test]
    fn test_cycle_target_wraps() {
        let mut sel = LanguageSelection::default();
        let (t, clip) = sel.cycle_target();
        assert_eq!(t, LanguageCode::Zh);
        assert_eq!(clip.0, "t_zh");
        let (t, _) = sel.cycle_target();
        assert_eq!(t, LanguageCode::En);
        let (t, clip) = sel.cycle_target();
        assert_eq!(t, LanguageCode::De);
        assert_eq!(clip.0, "t_de");
    }

    #[test]
    fn test_cycle_source_skips_target() {
        // target = de, so source cycles over {en, zh}
        let mut sel = LanguageSelection::default();
        let (s, clip) = sel.cycle_source();
        assert_eq!(s, LanguageCode::Zh);
        assert_eq!(clip.0, "de_zh");
        let (s, clip) = sel.cycle_source();
        assert_eq!(s, LanguageCode::En);
        assert_eq!(clip.0, "de_en");
    }

    #[test]
    fn test_cycle_source_snaps_when_colliding_with_target() {
        // Force source == target by cycling the target onto en
        let mut sel = LanguageSelection::new(LanguageCode::En, LanguageCode::Zh);
        let (t, _) = sel.cycle_target();
        assert_eq!(t, LanguageCode::En);
        assert!(sel.is_degenerate());

        // available = {de, zh}; source snaps to de, then advances to zh
        let (s, clip) = sel.cycle_source();
        assert_eq!(s, LanguageCode::Zh);
        assert_eq!(clip.0, "en_zh");
        assert!(!sel.is_degenerate());
    }

    #[test]
    fn test_user_channel_direction_is_reversed() {
        let sel = LanguageSelection::default();
        assert_eq!(
            sel.direction(RecordingChannel::Guest),
            (LanguageCode::En, LanguageCode::De)
        );
        assert_eq!(
            sel.direction(RecordingChannel::User),
            (LanguageCode::De, LanguageCode::En)
        );
    }
}
