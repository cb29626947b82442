use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfigBuilder, Preset};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub preset: Option<Preset>,
    pub layout: Option<LayoutSection>,
    pub header_footer: Option<HeaderFooterSection>,
    pub superscript: Option<SuperscriptSection>,
    pub fusion: Option<FusionSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutSection {
    pub line_overlap_ratio: Option<f64>,
    pub gap_factor: Option<f64>,
    pub min_word_gap: Option<f64>,
    pub enable_two_column_detect: Option<bool>,
    pub min_gutter_ratio: Option<f64>,
    pub ignore_header_ratio: Option<f64>,
    pub ignore_footer_ratio: Option<f64>,
    pub region_splits: Option<Vec<f64>>,
    pub enable_formula_protect: Option<bool>,
    pub formula_density_ratio: Option<f64>,
    pub formula_tolerance_ratio: Option<f64>,
}

/// `repeated_header_footer_*` options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderFooterSection {
    pub enabled: Option<bool>,
    pub similarity: Option<f64>,
    pub zone_ratio: Option<f64>,
    pub position_tolerance: Option<f64>,
    pub font_tolerance: Option<f64>,
    pub min_pages: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuperscriptSection {
    pub rise_ratio: Option<f64>,
    pub trailing_fallback_size_ratio: Option<f64>,
    pub trailing_fallback_max_chars: Option<usize>,
    pub token_gap_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionSection {
    pub max_id_multiplier: Option<f64>,
    pub min_bib_entries: Option<usize>,
    pub unlinked_penalty: Option<f64>,
    pub min_confidence: Option<f64>,
    pub floor_after_penalty: Option<bool>,
}

/// Platform config directory path: `<config_dir>/citemark/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citemark").join("config.toml"))
}

/// Load config by cascading CWD `.citemark.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".citemark.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

fn pick<S, T: Clone>(
    overlay: &Option<S>,
    base: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bl, ol) = (&base.layout, &overlay.layout);
    let (bh, oh) = (&base.header_footer, &overlay.header_footer);
    let (bs, os) = (&base.superscript, &overlay.superscript);
    let (bf, of) = (&base.fusion, &overlay.fusion);

    ConfigFile {
        preset: overlay.preset.or(base.preset),
        layout: Some(LayoutSection {
            line_overlap_ratio: pick(ol, bl, |s| s.line_overlap_ratio),
            gap_factor: pick(ol, bl, |s| s.gap_factor),
            min_word_gap: pick(ol, bl, |s| s.min_word_gap),
            enable_two_column_detect: pick(ol, bl, |s| s.enable_two_column_detect),
            min_gutter_ratio: pick(ol, bl, |s| s.min_gutter_ratio),
            ignore_header_ratio: pick(ol, bl, |s| s.ignore_header_ratio),
            ignore_footer_ratio: pick(ol, bl, |s| s.ignore_footer_ratio),
            region_splits: pick(ol, bl, |s| s.region_splits.clone()),
            enable_formula_protect: pick(ol, bl, |s| s.enable_formula_protect),
            formula_density_ratio: pick(ol, bl, |s| s.formula_density_ratio),
            formula_tolerance_ratio: pick(ol, bl, |s| s.formula_tolerance_ratio),
        }),
        header_footer: Some(HeaderFooterSection {
            enabled: pick(oh, bh, |s| s.enabled),
            similarity: pick(oh, bh, |s| s.similarity),
            zone_ratio: pick(oh, bh, |s| s.zone_ratio),
            position_tolerance: pick(oh, bh, |s| s.position_tolerance),
            font_tolerance: pick(oh, bh, |s| s.font_tolerance),
            min_pages: pick(oh, bh, |s| s.min_pages),
        }),
        superscript: Some(SuperscriptSection {
            rise_ratio: pick(os, bs, |s| s.rise_ratio),
            trailing_fallback_size_ratio: pick(os, bs, |s| s.trailing_fallback_size_ratio),
            trailing_fallback_max_chars: pick(os, bs, |s| s.trailing_fallback_max_chars),
            token_gap_ratio: pick(os, bs, |s| s.token_gap_ratio),
        }),
        fusion: Some(FusionSection {
            max_id_multiplier: pick(of, bf, |s| s.max_id_multiplier),
            min_bib_entries: pick(of, bf, |s| s.min_bib_entries),
            unlinked_penalty: pick(of, bf, |s| s.unlinked_penalty),
            min_confidence: pick(of, bf, |s| s.min_confidence),
            floor_after_penalty: pick(of, bf, |s| s.floor_after_penalty),
        }),
    }
}

impl ConfigFile {
    /// Feed every value present in the file into `builder`. Values already
    /// set on the builder are overwritten, so apply the file first and CLI
    /// flags afterwards.
    pub fn apply(&self, mut builder: AnalysisConfigBuilder) -> AnalysisConfigBuilder {
        if let Some(preset) = self.preset {
            builder = builder.preset(preset);
        }
        if let Some(l) = &self.layout {
            builder = apply_opt(builder, l.line_overlap_ratio, AnalysisConfigBuilder::line_overlap_ratio);
            builder = apply_opt(builder, l.gap_factor, AnalysisConfigBuilder::gap_factor);
            builder = apply_opt(builder, l.min_word_gap, AnalysisConfigBuilder::min_word_gap);
            builder = apply_opt(
                builder,
                l.enable_two_column_detect,
                AnalysisConfigBuilder::enable_two_column_detect,
            );
            builder = apply_opt(builder, l.min_gutter_ratio, AnalysisConfigBuilder::min_gutter_ratio);
            builder = apply_opt(
                builder,
                l.ignore_header_ratio,
                AnalysisConfigBuilder::ignore_header_ratio,
            );
            builder = apply_opt(
                builder,
                l.ignore_footer_ratio,
                AnalysisConfigBuilder::ignore_footer_ratio,
            );
            builder = apply_opt(
                builder,
                l.region_splits.clone(),
                AnalysisConfigBuilder::region_splits,
            );
            builder = apply_opt(
                builder,
                l.enable_formula_protect,
                AnalysisConfigBuilder::enable_formula_protect,
            );
            builder = apply_opt(
                builder,
                l.formula_density_ratio,
                AnalysisConfigBuilder::formula_density_ratio,
            );
            builder = apply_opt(
                builder,
                l.formula_tolerance_ratio,
                AnalysisConfigBuilder::formula_tolerance_ratio,
            );
        }
        if let Some(h) = &self.header_footer {
            builder = apply_opt(builder, h.enabled, AnalysisConfigBuilder::repeated_header_footer_enabled);
            builder = apply_opt(
                builder,
                h.similarity,
                AnalysisConfigBuilder::repeated_header_footer_similarity,
            );
            builder = apply_opt(
                builder,
                h.zone_ratio,
                AnalysisConfigBuilder::repeated_header_footer_zone_ratio,
            );
            builder = apply_opt(
                builder,
                h.position_tolerance,
                AnalysisConfigBuilder::repeated_header_footer_position_tolerance,
            );
            builder = apply_opt(
                builder,
                h.font_tolerance,
                AnalysisConfigBuilder::repeated_header_footer_font_tolerance,
            );
            builder = apply_opt(
                builder,
                h.min_pages,
                AnalysisConfigBuilder::repeated_header_footer_min_pages,
            );
        }
        if let Some(s) = &self.superscript {
            builder = apply_opt(builder, s.rise_ratio, AnalysisConfigBuilder::rise_ratio);
            builder = apply_opt(
                builder,
                s.trailing_fallback_size_ratio,
                AnalysisConfigBuilder::trailing_fallback_size_ratio,
            );
            builder = apply_opt(
                builder,
                s.trailing_fallback_max_chars,
                AnalysisConfigBuilder::trailing_fallback_max_chars,
            );
            builder = apply_opt(builder, s.token_gap_ratio, AnalysisConfigBuilder::token_gap_ratio);
        }
        if let Some(f) = &self.fusion {
            builder = apply_opt(builder, f.max_id_multiplier, AnalysisConfigBuilder::max_id_multiplier);
            builder = apply_opt(builder, f.min_bib_entries, AnalysisConfigBuilder::min_bib_entries);
            builder = apply_opt(builder, f.unlinked_penalty, AnalysisConfigBuilder::unlinked_penalty);
            builder = apply_opt(builder, f.min_confidence, AnalysisConfigBuilder::min_confidence);
            builder = apply_opt(
                builder,
                f.floor_after_penalty,
                AnalysisConfigBuilder::floor_after_penalty,
            );
        }
        builder
    }
}

fn apply_opt<T>(
    builder: AnalysisConfigBuilder,
    value: Option<T>,
    set: fn(AnalysisConfigBuilder, T) -> AnalysisConfigBuilder,
) -> AnalysisConfigBuilder {
    match value {
        Some(v) => set(builder, v),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_parses() {
        let config: ConfigFile = toml::from_str(
            r#"
            preset = "strict"

            [fusion]
            min_bib_entries = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.preset, Some(Preset::Strict));
        assert_eq!(config.fusion.and_then(|f| f.min_bib_entries), Some(10));
        assert!(config.layout.is_none());
    }

    #[test]
    fn test_merge_overlay_wins() {
        let base = ConfigFile {
            preset: Some(Preset::Recall),
            layout: Some(LayoutSection {
                gap_factor: Some(0.3),
                min_word_gap: Some(2.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            layout: Some(LayoutSection {
                gap_factor: Some(0.1),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(merged.preset, Some(Preset::Recall));
        let layout = merged.layout.unwrap();
        assert_eq!(layout.gap_factor, Some(0.1));
        assert_eq!(layout.min_word_gap, Some(2.0));
    }

    #[test]
    fn test_apply_feeds_builder() {
        let file = ConfigFile {
            preset: Some(Preset::Strict),
            fusion: Some(FusionSection {
                unlinked_penalty: Some(0.2),
                ..Default::default()
            }),
            header_footer: Some(HeaderFooterSection {
                enabled: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = file.apply(AnalysisConfigBuilder::new()).build().unwrap();
        assert_eq!(config.preset, Preset::Strict);
        assert!((config.fusion.unlinked_penalty - 0.2).abs() < f64::EPSILON);
        assert!((config.fusion.max_id_multiplier - 1.5).abs() < f64::EPSILON);
        assert!(!config.layout.running.enabled);
    }

    #[test]
    fn test_out_of_range_file_value_fails_at_build() {
        let file: ConfigFile = toml::from_str("[layout]\ngap_factor = -1.0\n").unwrap();
        assert!(file.apply(AnalysisConfigBuilder::new()).build().is_err());
    }

    #[test]
    fn test_load_from_path_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("absent.toml")).is_none());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "preset = [").unwrap();
        assert!(load_from_path(&bad).is_none());

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "preset = \"recall\"\n").unwrap();
        assert_eq!(load_from_path(&good).and_then(|c| c.preset), Some(Preset::Recall));
    }
}
