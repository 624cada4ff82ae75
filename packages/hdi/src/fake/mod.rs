//! In-process fake driver.
//!
//! Drop-in replacement for a hardware codec driver that needs no hardware:
//! a component manager with AVC/HEVC decoders and encoders, components that
//! turn every input buffer into one output frame, and graphic buffer queues.
//! Test hooks let callers freeze a component, raise errors and trigger
//! output format changes.

mod component;
mod surface;

pub use component::{
    FakeComponent, FakeComponentManager, FAKE_AVC_DECODER, FAKE_AVC_ENCODER, FAKE_HEVC_DECODER,
    FAKE_HEVC_ENCODER, FAKE_MAX_INSTANCES,
};
pub use surface::{FakeSurface, FakeSurfaceAllocator};
