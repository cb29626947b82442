use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("invalid region_splits: {0}")]
    InvalidRegionSplits(String),
    #[error("unknown preset '{0}' (expected strict, balanced or recall)")]
    UnknownPreset(String),
}

/// Named threshold bundle for the fusion stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Aggressive suppression of low-confidence and unlinked markers.
    Strict,
    #[default]
    Balanced,
    /// Minimal suppression, maximal retention.
    Recall,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Strict => "strict",
            Preset::Balanced => "balanced",
            Preset::Recall => "recall",
        }
    }

    /// Fusion thresholds this preset stands for.
    pub fn fusion(&self) -> FusionConfig {
        let (max_id_multiplier, unlinked_penalty, min_confidence) = match self {
            Preset::Strict => (1.5, 0.45, 0.5),
            Preset::Balanced => (3.0, 0.3, 0.2),
            Preset::Recall => (5.0, 0.15, 0.0),
        };
        FusionConfig {
            max_id_multiplier,
            unlinked_penalty,
            min_confidence,
            floor_after_penalty: matches!(self, Preset::Strict),
            ..FusionConfig::default()
        }
    }

    /// Size ratio below which a trailing glyph counts as abnormally small.
    pub fn trailing_fallback_size_ratio(&self) -> f64 {
        match self {
            Preset::Strict => 0.80,
            Preset::Balanced => 0.85,
            Preset::Recall => 0.90,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Preset::Strict),
            "balanced" => Ok(Preset::Balanced),
            "recall" => Ok(Preset::Recall),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

/// Running header/footer suppression.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningHeaderConfig {
    pub enabled: bool,
    /// Minimum fuzzy similarity (0..1) for two lines to count as the same header.
    pub similarity: f64,
    /// Fraction of page height at the top and bottom searched for running lines.
    pub zone_ratio: f64,
    /// Maximum vertical drift between pages, in points.
    pub position_tolerance: f64,
    /// Maximum font size drift, in points.
    pub font_tolerance: f64,
    /// Pages a line must repeat on before it is suppressed.
    pub min_pages: usize,
}

impl Default for RunningHeaderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity: 0.85,
            zone_ratio: 0.12,
            position_tolerance: 6.0,
            font_tolerance: 1.0,
            min_pages: 3,
        }
    }
}

/// Line reconstruction and span aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Vertical clustering tolerance as a fraction of the page's smallest font size.
    pub line_overlap_ratio: f64,
    pub gap_factor: f64,
    /// Smallest horizontal gap, in points, that always becomes a space.
    pub min_word_gap: f64,
    pub enable_two_column_detect: bool,
    /// Minimum gutter width as a fraction of page width.
    pub min_gutter_ratio: f64,
    pub ignore_header_ratio: f64,
    pub ignore_footer_ratio: f64,
    /// Band boundaries as fractions of page height, strictly increasing.
    pub region_splits: Vec<f64>,
    pub enable_formula_protect: bool,
    /// Share of symbol/italic characters that marks a line as formula-dense.
    pub formula_density_ratio: f64,
    /// Tolerance multiplier applied to formula-dense lines.
    pub formula_tolerance_ratio: f64,
    pub running: RunningHeaderConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            line_overlap_ratio: 0.5,
            gap_factor: 0.2,
            min_word_gap: 1.5,
            enable_two_column_detect: true,
            min_gutter_ratio: 0.03,
            ignore_header_ratio: 0.04,
            ignore_footer_ratio: 0.05,
            region_splits: vec![0.33, 0.66],
            enable_formula_protect: true,
            formula_density_ratio: 0.3,
            formula_tolerance_ratio: 1.8,
            running: RunningHeaderConfig::default(),
        }
    }
}

/// Superscript geometry thresholds. All ratios are relative to the regional
/// body size unless noted.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperscriptConfig {
    /// Minimum mid-point rise for the raised rule.
    pub rise_ratio: f64,
    /// Raised characters may be at most this much larger than body text.
    pub raised_size_ratio: f64,
    /// Maximum gap to the left neighbor for the attached rule.
    pub attach_gap_ratio: f64,
    /// Minimum top-edge lift over the neighbor, as a fraction of x-height.
    pub attach_rise_ratio: f64,
    /// Attached characters may be at most this much larger than the neighbor.
    pub attach_size_ratio: f64,
    /// Trailing glyphs strictly smaller than this ratio are fallback candidates.
    pub trailing_fallback_size_ratio: f64,
    /// Longest trailing run the fallback will flag.
    pub trailing_fallback_max_chars: usize,
    pub trailing_fallback_confidence: f64,
    /// Maximum gap inside one token.
    pub token_gap_ratio: f64,
}

impl Default for SuperscriptConfig {
    fn default() -> Self {
        Self {
            rise_ratio: 0.15,
            raised_size_ratio: 1.02,
            attach_gap_ratio: 0.6,
            attach_rise_ratio: 0.3,
            attach_size_ratio: 1.05,
            trailing_fallback_size_ratio: Preset::Balanced.trailing_fallback_size_ratio(),
            trailing_fallback_max_chars: 4,
            trailing_fallback_confidence: 0.5,
            token_gap_ratio: 0.8,
        }
    }
}

/// Reference list location and entry parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct BibliographyConfig {
    /// Headings before this fraction of the pages are ignored.
    pub search_start: f64,
    /// Trailing pages scanned when no heading is found.
    pub fallback_pages: usize,
    pub max_entry_chars: usize,
}

impl Default for BibliographyConfig {
    fn default() -> Self {
        Self {
            search_start: 0.4,
            fallback_pages: 2,
            max_entry_chars: 500,
        }
    }
}

/// Concrete fusion thresholds, resolved from a [`Preset`] plus overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// Candidates above `max_id * max_id_multiplier` are noise.
    pub max_id_multiplier: f64,
    /// Bibliographies with fewer entries disable the unlinked penalty.
    pub min_bib_entries: usize,
    pub unlinked_penalty: f64,
    /// Occurrences whose detection confidence is below this are dropped.
    pub min_confidence: f64,
    /// Judge the floor on the penalized confidence instead of the detection
    /// confidence, so the unlinked penalty alone can drop an occurrence.
    pub floor_after_penalty: bool,
    pub corroboration_boost: f64,
    /// Maximum center distance, in points, for two candidates to share a location.
    pub dedup_distance: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_id_multiplier: 3.0,
            min_bib_entries: 3,
            unlinked_penalty: 0.3,
            min_confidence: 0.2,
            floor_after_penalty: false,
            corroboration_boost: 0.1,
            dedup_distance: 3.0,
        }
    }
}

/// Full analysis configuration. Construct through [`AnalysisConfigBuilder`]
/// so ranges are validated; `Default` is the balanced preset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisConfig {
    pub preset: Preset,
    pub layout: LayoutConfig,
    pub superscript: SuperscriptConfig,
    pub bibliography: BibliographyConfig,
    pub fusion: FusionConfig,
}

impl AnalysisConfig {
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
    }
}

/// Builder for [`AnalysisConfig`].
///
/// The preset is resolved first; explicit setters override individual values
/// on top of it. [`build()`](Self::build) rejects out-of-range values instead
/// of clamping them.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfigBuilder {
    preset: Option<Preset>,
    line_overlap_ratio: Option<f64>,
    gap_factor: Option<f64>,
    min_word_gap: Option<f64>,
    enable_two_column_detect: Option<bool>,
    min_gutter_ratio: Option<f64>,
    ignore_header_ratio: Option<f64>,
    ignore_footer_ratio: Option<f64>,
    region_splits: Option<Vec<f64>>,
    repeated_header_footer_enabled: Option<bool>,
    repeated_header_footer_similarity: Option<f64>,
    repeated_header_footer_zone_ratio: Option<f64>,
    repeated_header_footer_position_tolerance: Option<f64>,
    repeated_header_footer_font_tolerance: Option<f64>,
    repeated_header_footer_min_pages: Option<usize>,
    enable_formula_protect: Option<bool>,
    formula_density_ratio: Option<f64>,
    formula_tolerance_ratio: Option<f64>,
    rise_ratio: Option<f64>,
    trailing_fallback_size_ratio: Option<f64>,
    trailing_fallback_max_chars: Option<usize>,
    token_gap_ratio: Option<f64>,
    max_id_multiplier: Option<f64>,
    min_bib_entries: Option<usize>,
    unlinked_penalty: Option<f64>,
    min_confidence: Option<f64>,
    floor_after_penalty: Option<bool>,
}

macro_rules! setter {
    ($name:ident: $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.$name = Some(value);
            self
        }
    };
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    setter!(preset: Preset);

    // ── Line reconstruction ──
    setter!(line_overlap_ratio: f64);
    setter!(gap_factor: f64);
    setter!(min_word_gap: f64);
    setter!(enable_two_column_detect: bool);
    setter!(min_gutter_ratio: f64);
    setter!(ignore_header_ratio: f64);
    setter!(ignore_footer_ratio: f64);
    setter!(region_splits: Vec<f64>);
    setter!(repeated_header_footer_enabled: bool);
    setter!(repeated_header_footer_similarity: f64);
    setter!(repeated_header_footer_zone_ratio: f64);
    setter!(repeated_header_footer_position_tolerance: f64);
    setter!(repeated_header_footer_font_tolerance: f64);
    setter!(repeated_header_footer_min_pages: usize);
    setter!(enable_formula_protect: bool);
    setter!(formula_density_ratio: f64);
    setter!(formula_tolerance_ratio: f64);

    // ── Superscripts ──
    setter!(rise_ratio: f64);
    setter!(trailing_fallback_size_ratio: f64);
    setter!(trailing_fallback_max_chars: usize);
    setter!(token_gap_ratio: f64);

    // ── Fusion ──
    setter!(max_id_multiplier: f64);
    setter!(min_bib_entries: usize);
    setter!(unlinked_penalty: f64);
    setter!(min_confidence: f64);
    setter!(floor_after_penalty: bool);

    /// Resolve the preset, apply overrides and validate.
    pub fn build(self) -> Result<AnalysisConfig, ConfigError> {
        let preset = self.preset.unwrap_or_default();

        let mut layout = LayoutConfig::default();
        override_with(&mut layout.line_overlap_ratio, self.line_overlap_ratio);
        override_with(&mut layout.gap_factor, self.gap_factor);
        override_with(&mut layout.min_word_gap, self.min_word_gap);
        override_with(&mut layout.enable_two_column_detect, self.enable_two_column_detect);
        override_with(&mut layout.min_gutter_ratio, self.min_gutter_ratio);
        override_with(&mut layout.ignore_header_ratio, self.ignore_header_ratio);
        override_with(&mut layout.ignore_footer_ratio, self.ignore_footer_ratio);
        override_with(&mut layout.region_splits, self.region_splits);
        override_with(&mut layout.enable_formula_protect, self.enable_formula_protect);
        override_with(&mut layout.formula_density_ratio, self.formula_density_ratio);
        override_with(&mut layout.formula_tolerance_ratio, self.formula_tolerance_ratio);
        let running = &mut layout.running;
        override_with(&mut running.enabled, self.repeated_header_footer_enabled);
        override_with(&mut running.similarity, self.repeated_header_footer_similarity);
        override_with(&mut running.zone_ratio, self.repeated_header_footer_zone_ratio);
        override_with(
            &mut running.position_tolerance,
            self.repeated_header_footer_position_tolerance,
        );
        override_with(&mut running.font_tolerance, self.repeated_header_footer_font_tolerance);
        override_with(&mut running.min_pages, self.repeated_header_footer_min_pages);

        let mut superscript = SuperscriptConfig {
            trailing_fallback_size_ratio: preset.trailing_fallback_size_ratio(),
            ..SuperscriptConfig::default()
        };
        override_with(&mut superscript.rise_ratio, self.rise_ratio);
        override_with(
            &mut superscript.trailing_fallback_size_ratio,
            self.trailing_fallback_size_ratio,
        );
        override_with(
            &mut superscript.trailing_fallback_max_chars,
            self.trailing_fallback_max_chars,
        );
        override_with(&mut superscript.token_gap_ratio, self.token_gap_ratio);

        let mut fusion = preset.fusion();
        override_with(&mut fusion.max_id_multiplier, self.max_id_multiplier);
        override_with(&mut fusion.min_bib_entries, self.min_bib_entries);
        override_with(&mut fusion.unlinked_penalty, self.unlinked_penalty);
        override_with(&mut fusion.min_confidence, self.min_confidence);
        override_with(&mut fusion.floor_after_penalty, self.floor_after_penalty);

        let config = AnalysisConfig {
            preset,
            layout,
            superscript,
            bibliography: BibliographyConfig::default(),
            fusion,
        };
        config.validate()?;
        Ok(config)
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, expected: "> 0" })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, expected: ">= 0" })
    }
}

fn unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, expected: "0..=1" })
    }
}

impl AnalysisConfig {
    /// Check every threshold against its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.layout;
        positive("line_overlap_ratio", l.line_overlap_ratio)?;
        non_negative("gap_factor", l.gap_factor)?;
        non_negative("min_word_gap", l.min_word_gap)?;
        unit("min_gutter_ratio", l.min_gutter_ratio)?;
        unit("ignore_header_ratio", l.ignore_header_ratio)?;
        unit("ignore_footer_ratio", l.ignore_footer_ratio)?;
        if l.ignore_header_ratio + l.ignore_footer_ratio >= 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "ignore_header_ratio + ignore_footer_ratio",
                value: l.ignore_header_ratio + l.ignore_footer_ratio,
                expected: "< 1",
            });
        }
        validate_splits(&l.region_splits)?;
        unit("formula_density_ratio", l.formula_density_ratio)?;
        if !(l.formula_tolerance_ratio >= 1.0 && l.formula_tolerance_ratio.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "formula_tolerance_ratio",
                value: l.formula_tolerance_ratio,
                expected: ">= 1",
            });
        }
        unit("repeated_header_footer_similarity", l.running.similarity)?;
        unit("repeated_header_footer_zone_ratio", l.running.zone_ratio)?;
        non_negative("repeated_header_footer_position_tolerance", l.running.position_tolerance)?;
        non_negative("repeated_header_footer_font_tolerance", l.running.font_tolerance)?;
        if l.running.min_pages < 2 {
            return Err(ConfigError::OutOfRange {
                field: "repeated_header_footer_min_pages",
                value: l.running.min_pages as f64,
                expected: ">= 2",
            });
        }

        let s = &self.superscript;
        positive("rise_ratio", s.rise_ratio)?;
        positive("raised_size_ratio", s.raised_size_ratio)?;
        non_negative("attach_gap_ratio", s.attach_gap_ratio)?;
        positive("attach_rise_ratio", s.attach_rise_ratio)?;
        positive("attach_size_ratio", s.attach_size_ratio)?;
        unit("trailing_fallback_size_ratio", s.trailing_fallback_size_ratio)?;
        unit("trailing_fallback_confidence", s.trailing_fallback_confidence)?;
        non_negative("token_gap_ratio", s.token_gap_ratio)?;

        let b = &self.bibliography;
        unit("bib_search_start", b.search_start)?;

        let f = &self.fusion;
        if !(f.max_id_multiplier >= 1.0 && f.max_id_multiplier.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "max_id_multiplier",
                value: f.max_id_multiplier,
                expected: ">= 1",
            });
        }
        unit("unlinked_penalty", f.unlinked_penalty)?;
        unit("min_confidence", f.min_confidence)?;
        unit("corroboration_boost", f.corroboration_boost)?;
        non_negative("dedup_distance", f.dedup_distance)?;
        Ok(())
    }
}

fn validate_splits(splits: &[f64]) -> Result<(), ConfigError> {
    if let Some(bad) = splits.iter().find(|s| !(**s > 0.0 && **s < 1.0)) {
        return Err(ConfigError::InvalidRegionSplits(format!(
            "{bad} is outside (0, 1)"
        )));
    }
    if splits.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ConfigError::InvalidRegionSplits(
            "values must be strictly increasing".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid_balanced() {
        let config = AnalysisConfig::default();
        assert_eq!(config.preset, Preset::Balanced);
        assert!(config.validate().is_ok());
        assert_eq!(config, AnalysisConfigBuilder::new().build().unwrap());
    }

    #[test]
    fn test_presets_order_thresholds() {
        let strict = AnalysisConfig::builder().preset(Preset::Strict).build().unwrap();
        let recall = AnalysisConfig::builder().preset(Preset::Recall).build().unwrap();
        let balanced = AnalysisConfig::default();

        assert!(strict.fusion.max_id_multiplier < balanced.fusion.max_id_multiplier);
        assert!(recall.fusion.max_id_multiplier > balanced.fusion.max_id_multiplier);
        assert!(strict.fusion.unlinked_penalty > recall.fusion.unlinked_penalty);
        assert!(strict.fusion.min_confidence > recall.fusion.min_confidence);
        assert!(strict.fusion.floor_after_penalty);
        assert!(!balanced.fusion.floor_after_penalty && !recall.fusion.floor_after_penalty);
        assert!(
            strict.superscript.trailing_fallback_size_ratio
                < recall.superscript.trailing_fallback_size_ratio
        );
    }

    #[test]
    fn test_override_applies_on_top_of_preset() {
        let config = AnalysisConfig::builder()
            .preset(Preset::Strict)
            .max_id_multiplier(4.0)
            .build()
            .unwrap();
        assert!((config.fusion.max_id_multiplier - 4.0).abs() < f64::EPSILON);
        assert!((config.fusion.unlinked_penalty - 0.45).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negative_ratio_rejected() {
        let err = AnalysisConfig::builder().line_overlap_ratio(-0.5).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange { field: "line_overlap_ratio", .. }
        ));
        assert!(err.to_string().contains("line_overlap_ratio"));
    }

    #[test]
    fn test_margin_ratios_cannot_cover_page() {
        let result = AnalysisConfig::builder()
            .ignore_header_ratio(0.6)
            .ignore_footer_ratio(0.5)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_region_splits_validation() {
        assert!(AnalysisConfig::builder().region_splits(vec![]).build().is_ok());
        assert!(matches!(
            AnalysisConfig::builder().region_splits(vec![0.5, 0.4]).build(),
            Err(ConfigError::InvalidRegionSplits(_))
        ));
        assert!(matches!(
            AnalysisConfig::builder().region_splits(vec![1.2]).build(),
            Err(ConfigError::InvalidRegionSplits(_))
        ));
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        assert!(AnalysisConfig::builder().max_id_multiplier(0.5).build().is_err());
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("STRICT".parse::<Preset>(), Ok(Preset::Strict));
        assert_eq!(" recall ".parse::<Preset>(), Ok(Preset::Recall));
        assert!(matches!(
            "greedy".parse::<Preset>(),
            Err(ConfigError::UnknownPreset(_))
        ));
    }
}
