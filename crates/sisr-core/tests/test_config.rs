use sisr_core::calibration::NormalizeMode;
use sisr_core::combine::{CombineMethod, SigmaClipParams};
use sisr_core::error::SisrError;
use sisr_core::pipeline::{PipelineConfig, PipelineStage};
use sisr_core::reduce::{BackgroundPolicy, BackgroundStatistic, MaskBackground};
use sisr_core::register::AlignMethod;
use sisr_core::solve::SearchHint;

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[test]
fn test_enum_display() {
    assert_eq!(CombineMethod::Median.to_string(), "median");
    assert_eq!(NormalizeMode::Mean.to_string(), "mean");
    assert_eq!(AlignMethod::Reproject.to_string(), "reproject");
    assert_eq!(PipelineStage::PlateSolve.to_string(), "Plate solving");
    assert_eq!(BackgroundPolicy::None.to_string(), "none");
    assert_eq!(
        BackgroundPolicy::Simple {
            statistic: BackgroundStatistic::Mean
        }
        .to_string(),
        "simple mean"
    );
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn test_defaults() {
    let config = PipelineConfig::new("/data/night");
    assert_eq!(config.combine.dark.method, CombineMethod::Median);
    assert_eq!(config.combine.stack.method, CombineMethod::Median);
    assert!(config.combine.flat.sigma_clip.is_none());
    assert_eq!(config.flat.normalize, NormalizeMode::Mean);
    assert_eq!(config.align.method, AlignMethod::Reproject);
    assert!(!config.align.allow_incomplete_group);
    assert!(config.reduction.clean_before_background);
    assert!(config.reduction.artifacts.enabled);
    assert!(!config.stages.diagnostics);
    assert_eq!(config.solve.executable.to_str(), Some("solve-field"));
    assert_eq!(config.stages.to_string(), "reduce -> solve -> align -> stack");
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[test]
fn test_nested_sections_deserialize() {
    let json = r#"{
        "input": "/data/night",
        "combine": {"stack": {"method": "mean", "sigma_clip": {"sigma": 2.5}}},
        "reduction": {"background": {"method": "mask", "mesh_size": 32}},
        "solve": {"search": {"ra": "10.68", "dec": "41.27", "radius": 1.5}},
        "align": {"method": "feature", "allow_incomplete_group": true},
        "stages": {"diagnostics": true}
    }"#;
    let config: PipelineConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.combine.stack.method, CombineMethod::Mean);
    let clip = config.combine.stack.sigma_clip.clone().unwrap();
    assert_eq!(clip.sigma, 2.5);
    assert_eq!(clip.iterations, SigmaClipParams::default().iterations);
    match &config.reduction.background {
        BackgroundPolicy::Mask(p) => {
            assert_eq!(p.mesh_size, 32);
            assert_eq!(p.snr, MaskBackground::default().snr);
        }
        other => panic!("unexpected background {other:?}"),
    }
    assert_eq!(
        config.solve.search,
        Some(SearchHint {
            ra: "10.68".into(),
            dec: "41.27".into(),
            radius: 1.5
        })
    );
    assert_eq!(config.align.method, AlignMethod::Feature);
    assert!(config.align.allow_incomplete_group);
    assert!(config.stages.diagnostics && config.stages.solve);
    assert!(config.validate().is_ok());
}

#[test]
fn test_round_trip_preserves_config() {
    let mut config = PipelineConfig::new("/data/night");
    config.reduction.background = BackgroundPolicy::None;
    config.combine.dark.memory_limit_bytes = Some(64 << 20);
    config.stages.solve = false;
    let json = serde_json::to_string(&config).unwrap();
    let back: PipelineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn test_validation_rejects_unusable_settings() {
    let mut config = PipelineConfig::new("/data");
    config.combine.dark.sigma_clip = Some(SigmaClipParams {
        sigma: 0.0,
        ..Default::default()
    });
    assert!(matches!(config.validate(), Err(SisrError::Config(_))));

    let mut config = PipelineConfig::new("/data");
    config.reduction.background = BackgroundPolicy::Mask(MaskBackground {
        mesh_size: 0,
        ..Default::default()
    });
    assert!(matches!(config.validate(), Err(SisrError::Config(_))));

    let mut config = PipelineConfig::new("/data");
    config.solve.search = Some(SearchHint {
        ra: "0".into(),
        dec: "0".into(),
        radius: f64::NAN,
    });
    assert!(matches!(config.validate(), Err(SisrError::Config(_))));
}
