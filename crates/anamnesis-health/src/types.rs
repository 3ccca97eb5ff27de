use serde::{Deserialize, Serialize};

/// Per-layer probe result. `detail` carries the probe's own error message
/// on failure, or a short description of what was checked on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerHealth {
    pub ok: bool,
    pub detail: String,
    pub last_op_ms: f64,
}

impl LayerHealth {
    pub fn ok(detail: impl Into<String>, last_op_ms: f64) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
            last_op_ms,
        }
    }

    pub fn down(detail: impl Into<String>, last_op_ms: f64) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
            last_op_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub ok: bool,
    pub capture: LayerHealth,
    pub anchors: LayerHealth,
    pub texture: LayerHealth,
    pub crystals: LayerHealth,
    pub inventory: LayerHealth,
}
