//! Deferred rendering pipeline
//!
//! Per frame:
//! 1. G-buffer pass - scene batches and billboards into color, normal and depth
//! 2. Lighting pass - light volumes and full-screen lights into the light target
//! 3. Composition - G-buffer resolved into the final target, optionally through FXAA and bloom
//! 4. Present - background and letterboxed blit into the back buffer

pub mod bloom;
pub mod effect;
pub mod fullscreen_quad;
pub mod fxaa;
pub mod gbuffer;
pub mod geometry;
pub mod lighting;
pub mod present;

pub use bloom::{BloomDebugView, BloomProcessor, BloomSettings, BloomStage, PRESETS};
pub use fullscreen_quad::FullscreenQuad;
pub use fxaa::{FxaaProcessor, FxaaSettings};
pub use gbuffer::{ClearEffect, CombineEffect, GBuffer, GBufferTargets};
pub use geometry::{GeometryRenderer, MAX_BILLBOARDS};
pub use lighting::{LightQueues, LightRenderer, MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS};
pub use present::{BackgroundMode, CopyEffect, Presenter};

/// Render target of a composition step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComposeTarget {
    IntermediateA,
    IntermediateB,
    /// The image blitted to the back buffer at present time
    Final,
}

/// One pass of the composition chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComposeStep {
    /// Resolve the lit G-buffer into a target
    Combine { to: ComposeTarget },
    Fxaa { from: ComposeTarget, to: ComposeTarget },
    Bloom { from: ComposeTarget, to: ComposeTarget },
}

/// Ordered composition passes selected by the post-processing flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComposePlan {
    /// Debug group label the composition is recorded under
    pub label: &'static str,
    pub steps: &'static [ComposeStep],
}

use ComposeStep::*;
use ComposeTarget::*;

const DIRECT: ComposePlan = ComposePlan {
    label: "compose.direct",
    steps: &[Combine { to: Final }],
};

const FXAA_ONLY: ComposePlan = ComposePlan {
    label: "compose.fxaa",
    steps: &[
        Combine { to: IntermediateA },
        Fxaa { from: IntermediateA, to: Final },
    ],
};

const BLOOM_ONLY: ComposePlan = ComposePlan {
    label: "compose.bloom",
    steps: &[
        Combine { to: IntermediateA },
        Bloom { from: IntermediateA, to: Final },
    ],
};

const FXAA_BLOOM: ComposePlan = ComposePlan {
    label: "compose.fxaa_bloom",
    steps: &[
        Combine { to: IntermediateA },
        Fxaa { from: IntermediateA, to: IntermediateB },
        Bloom { from: IntermediateB, to: Final },
    ],
};

/// Composition passes for the given flags
pub fn compose_plan(fxaa: bool, bloom: bool) -> ComposePlan {
    match (fxaa, bloom) {
        (false, false) => DIRECT,
        (true, false) => FXAA_ONLY,
        (false, true) => BLOOM_ONLY,
        (true, true) => FXAA_BLOOM,
    }
}
