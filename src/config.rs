use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::Error;
use crate::kinematics::{Joint, Side, SignConvention, Signal};
use crate::tracker::{BindingPolicy, ThresholdDirection};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub angles: AngleConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub binding: BindingConfig,
    #[serde(default)]
    pub squat: SquatConfig,
    #[serde(default)]
    pub gait: GaitConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AngleConfig {
    /// これ未満の信頼度のキーポイントを含む角度は欠測 (None)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// 記録・歩行解析に使う脚
    #[serde(default = "default_side")]
    pub side: Side,
    /// 股関節: 正 = 伸展
    #[serde(default = "default_hip_sign")]
    pub hip_sign: SignConvention,
    /// 膝関節: 正 = 屈曲
    #[serde(default = "default_knee_sign")]
    pub knee_sign: SignConvention,
    #[serde(default = "default_elbow_sign")]
    pub elbow_sign: SignConvention,
}

fn default_confidence_threshold() -> f32 { 0.5 }
fn default_side() -> Side { Side::Left }
fn default_hip_sign() -> SignConvention { SignConvention::Inverted }
fn default_knee_sign() -> SignConvention { SignConvention::AsComputed }
fn default_elbow_sign() -> SignConvention { SignConvention::Unsigned }

impl Default for AngleConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            side: default_side(),
            hip_sign: default_hip_sign(),
            knee_sign: default_knee_sign(),
            elbow_sign: default_elbow_sign(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// ローリング表示の時間幅（秒）
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,
    /// 表示する角度信号
    #[serde(default = "default_display_signals")]
    pub signals: Vec<Signal>,
}

fn default_window_secs() -> f64 { 5.0 }
fn default_display_signals() -> Vec<Signal> {
    vec![
        Signal::new(Side::Left, Joint::Hip),
        Signal::new(Side::Left, Joint::Knee),
        Signal::new(Side::Left, Joint::Elbow),
    ]
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            signals: default_display_signals(),
        }
    }
}

/// ロールごとのトラック選択方針
#[derive(Debug, Deserialize, Clone)]
pub struct BindingConfig {
    #[serde(default = "default_policy")]
    pub display: BindingPolicy,
    #[serde(default = "default_policy")]
    pub squat: BindingPolicy,
    #[serde(default = "default_policy")]
    pub gait: BindingPolicy,
}

fn default_policy() -> BindingPolicy { BindingPolicy::LowestId }

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            display: default_policy(),
            squat: default_policy(),
            gait: default_policy(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SquatConfig {
    /// 動作確定に必要な連続フレーム数
    #[serde(default = "default_validation_frames")]
    pub validation_frames: u32,
    #[serde(default = "default_squat_signal")]
    pub signal: Signal,
    /// 膝屈曲角の閾値（度）
    #[serde(default = "default_squat_threshold")]
    pub threshold_deg: f64,
    #[serde(default = "default_squat_direction")]
    pub direction: ThresholdDirection,
}

fn default_validation_frames() -> u32 { 3 }
fn default_squat_signal() -> Signal { Signal::new(Side::Left, Joint::Knee) }
fn default_squat_threshold() -> f64 { 90.0 }
fn default_squat_direction() -> ThresholdDirection { ThresholdDirection::Above }

impl Default for SquatConfig {
    fn default() -> Self {
        Self {
            validation_frames: default_validation_frames(),
            signal: default_squat_signal(),
            threshold_deg: default_squat_threshold(),
            direction: default_squat_direction(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GaitConfig {
    /// ローパスのカットオフ周波数 (Hz)
    #[serde(default = "default_cutoff_hz")]
    pub cutoff_hz: f64,
    /// 接地イベント間の最小間隔（秒）
    #[serde(default = "default_min_spacing_secs")]
    pub min_spacing_secs: f64,
    /// 極小値の最小プロミネンス（ピクセル）
    #[serde(default = "default_prominence")]
    pub prominence: f64,
    /// 正規化ストライドの点数 (0〜100%)
    #[serde(default = "default_resample_points")]
    pub resample_points: usize,
    /// タイムスタンプからサンプリング周波数を求められない場合の値
    #[serde(default = "default_fallback_fps")]
    pub fallback_fps: f64,
    /// これ未満のフレーム数の記録は解析しない
    #[serde(default = "default_min_frames")]
    pub min_frames: usize,
}

fn default_cutoff_hz() -> f64 { 10.0 }
fn default_min_spacing_secs() -> f64 { 0.25 }
fn default_prominence() -> f64 { 5.0 }
fn default_resample_points() -> usize { 101 }
fn default_fallback_fps() -> f64 { 30.0 }
fn default_min_frames() -> usize { 30 }

impl Default for GaitConfig {
    fn default() -> Self {
        Self {
            cutoff_hz: default_cutoff_hz(),
            min_spacing_secs: default_min_spacing_secs(),
            prominence: default_prominence(),
            resample_points: default_resample_points(),
            fallback_fps: default_fallback_fps(),
            min_frames: default_min_frames(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String { "0.0.0.0:9500".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidConfig(msg.into())
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// 読み込みに失敗した場合はデフォルト値
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let t = self.angles.confidence_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(invalid(format!(
                "angles.confidence_threshold must be in (0, 1], got {t}"
            )));
        }
        let w = self.display.window_secs;
        if !(w.is_finite() && w > 0.0) {
            return Err(invalid(format!("display.window_secs must be positive, got {w}")));
        }
        if self.squat.validation_frames == 0 {
            return Err(invalid("squat.validation_frames must be at least 1"));
        }
        if !self.squat.threshold_deg.is_finite() {
            return Err(invalid("squat.threshold_deg must be finite"));
        }
        let g = &self.gait;
        if !(g.cutoff_hz.is_finite() && g.cutoff_hz > 0.0) {
            return Err(invalid(format!("gait.cutoff_hz must be positive, got {}", g.cutoff_hz)));
        }
        if !(g.min_spacing_secs.is_finite() && g.min_spacing_secs >= 0.0) {
            return Err(invalid("gait.min_spacing_secs must be non-negative"));
        }
        if !(g.prominence.is_finite() && g.prominence >= 0.0) {
            return Err(invalid("gait.prominence must be non-negative"));
        }
        if g.resample_points < 2 {
            return Err(invalid(format!(
                "gait.resample_points must be at least 2, got {}",
                g.resample_points
            )));
        }
        if !(g.fallback_fps.is_finite() && g.fallback_fps > 0.0) {
            return Err(invalid("gait.fallback_fps must be positive"));
        }
        Ok(())
    }
}
