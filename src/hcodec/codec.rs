//! Codec instance owned by the message loop thread.
//!
//! [`Codec`] holds everything a running instance needs: the driver
//! component, both buffer pools, the negotiated formats and the state
//! machine bookkeeping. Only the loop thread ever touches it.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hcodec_hdi::{
    BufferFlushConfig, BufferRequestConfig, CodecCommand, CodecEvent, CodingType, Component,
    ComponentCallback, ComponentExt, GraphicPixelFormat, OmxCodecBuffer, OmxState, PortDefinition,
    PortIndex, Surface, VideoPortFormat,
};

use super::buffer::{BufferInfo, BufferOperationMode, BufferOwner};
use super::msg::{Msg, MsgWhat, Reply};
use super::state::StateId;
use super::{decoder, encoder};
use crate::msg_loop::{LoopHandle, MsgHandler, MsgId, MsgInfo, WeakLoopHandle};
use crate::state_machine::StateMachine;
use crate::{CodecCallback, CodecError, CodecOptions, CodecResult, ErrorType, Format, HdiContext};

pub(crate) type Handle = LoopHandle<Msg, Reply>;

/// Frame rates travel in Q16 fixed point.
pub(crate) const FRAME_RATE_COEFFICIENT: f64 = 65536.0;

/// Frame rate in Q16 fixed point, rejecting rates the port cannot carry.
pub(crate) fn q16_frame_rate(rate: f64) -> CodecResult<u32> {
    let q16 = rate * FRAME_RATE_COEFFICIENT;
    if !q16.is_finite() || q16 < 1.0 || q16 > f64::from(u32::MAX) {
        tracing::error!("invalid frame rate {}", rate);
        return Err(CodecError::InvalidVal);
    }
    Ok(q16 as u32)
}

const OMX_STATE_POLL_INTERVAL: Duration = Duration::from_millis(10);
const OMX_STATE_POLL_TRIES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Decoder,
    Encoder,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Decoder => "decoder",
            Self::Encoder => "encoder",
        })
    }
}

/// Geometry of the raw frames carried in shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct SharedBufferFormat {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) stride: i32,
}

/// What [`Codec::set_video_port_info`] writes into a port.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PortInfo {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) input_buf_size: Option<u32>,
    pub(crate) coding: CodingType,
    pub(crate) pixel_fmt: GraphicPixelFormat,
    pub(crate) frame_rate: f64,
}

#[derive(Default)]
pub(crate) struct DecoderContext {
    /// Producer end of the display queue. Set means surface output mode.
    pub(crate) output_surface: Option<Arc<dyn Surface>>,
    pub(crate) out_buffer_count: u32,
    pub(crate) request_cfg: BufferRequestConfig,
    /// Crop rectangle and timestamp of the next render.
    pub(crate) flush_cfg: BufferFlushConfig,
}

#[derive(Default)]
pub(crate) struct EncoderContext {
    /// Consumer end of the input queue. Set means dynamic-handle input mode.
    pub(crate) input_surface: Option<Arc<dyn Surface>>,
    /// Surface frames left in the queue, either because no input slot was
    /// free or because buffers were not circulating yet.
    pub(crate) pending_surface_frames: u32,
    /// End of stream requested while it could not be submitted.
    pub(crate) pending_eos: bool,
}

/// Driver callback sink. Only forwards to the loop; the loop may already
/// be gone when the driver calls.
struct HdiCallback {
    handle: WeakLoopHandle<Msg, Reply>,
}

impl HdiCallback {
    fn post(&self, msg: Msg) {
        match self.handle.upgrade() {
            Some(handle) => handle.send_async(msg, Duration::ZERO),
            None => tracing::debug!("codec is gone, drop {}", msg.what()),
        }
    }
}

impl ComponentCallback for HdiCallback {
    fn event_handler(&self, event: CodecEvent) {
        tracing::info!("event {:?}", event);
        self.post(Msg::CodecEvent(event));
    }

    fn empty_buffer_done(&self, _app_data: i64, buffer: &OmxCodecBuffer) {
        self.post(Msg::EmptyBufferDone(buffer.buffer_id));
    }

    fn fill_buffer_done(&self, _app_data: i64, buffer: &OmxCodecBuffer) {
        self.post(Msg::FillBufferDone(buffer.clone()));
    }
}

pub(crate) struct Codec {
    pub(crate) direction: Direction,
    pub(crate) coding_type: CodingType,
    pub(crate) ctx: HdiContext,
    pub(crate) options: CodecOptions,
    pub(crate) handle: Handle,

    pub(crate) state: Option<StateId>,
    /// Bumped on every state exit; stale watchdogs compare against it.
    pub(crate) generation: u64,
    deferred: Vec<MsgInfo<Msg>>,
    pending_replies: HashMap<MsgWhat, VecDeque<MsgId>>,

    pub(crate) component: Option<Arc<dyn Component>>,
    component_id: u32,
    pub(crate) component_name: String,

    pub(crate) callback: Option<Arc<dyn CodecCallback>>,
    pub(crate) config_format: Option<Format>,
    pub(crate) input_format: Option<Format>,
    pub(crate) output_format: Option<Format>,
    pub(crate) shared_buffer_format: Option<SharedBufferFormat>,

    pub(crate) pools: [Vec<BufferInfo>; 2],
    pub(crate) input_eos: bool,
    pub(crate) output_eos: bool,
    pub(crate) buffers_circulating: bool,
    /// Sticky once set.
    pub(crate) has_fatal_error: bool,

    pub(crate) starting_has_error: bool,
    pub(crate) flush_complete: [bool; 2],
    pub(crate) stopping_idle: bool,
    pub(crate) changing_to_loaded: bool,
    pub(crate) is_shut_down_from_running: bool,
    pub(crate) notify_caller: bool,
    pub(crate) keep_component_allocated: bool,

    pub(crate) etb_count: u64,
    pub(crate) ftb_count: u64,
    pub(crate) fbd_count: u64,

    pub(crate) dec: DecoderContext,
    pub(crate) enc: EncoderContext,
}

impl Codec {
    pub(crate) fn new(
        direction: Direction,
        coding_type: CodingType,
        ctx: HdiContext,
        options: CodecOptions,
        handle: Handle,
    ) -> Self {
        Self {
            direction,
            coding_type,
            ctx,
            options,
            handle,
            state: None,
            generation: 0,
            deferred: Vec::new(),
            pending_replies: HashMap::new(),
            component: None,
            component_id: 0,
            component_name: String::new(),
            callback: None,
            config_format: None,
            input_format: None,
            output_format: None,
            shared_buffer_format: None,
            pools: [Vec::new(), Vec::new()],
            input_eos: false,
            output_eos: false,
            buffers_circulating: false,
            has_fatal_error: false,
            starting_has_error: false,
            flush_complete: [false; 2],
            stopping_idle: false,
            changing_to_loaded: false,
            is_shut_down_from_running: false,
            notify_caller: false,
            keep_component_allocated: false,
            etb_count: 0,
            ftb_count: 0,
            fbd_count: 0,
            dec: DecoderContext::default(),
            enc: EncoderContext::default(),
        }
    }

    pub(crate) fn reply(&self, id: MsgId, reply: Reply) {
        if id == 0 {
            return;
        }
        self.handle.post_reply(id, reply);
    }

    pub(crate) fn reply_status(&self, id: MsgId, result: CodecResult) {
        self.reply(id, Reply::Status(result));
    }

    pub(crate) fn defer(&mut self, info: MsgInfo<Msg>) {
        tracing::debug!("defer {}", info.msg.what());
        self.deferred.push(info);
    }

    /// Replay deferred messages in arrival order through the current state.
    pub(crate) fn process_deferred_messages(&mut self) {
        let deferred = std::mem::take(&mut self.deferred);
        for info in deferred {
            self.on_msg_received(info);
        }
    }

    pub(crate) fn reply_later(&mut self, what: MsgWhat, id: MsgId) {
        self.pending_replies.entry(what).or_default().push_back(id);
    }

    /// Oldest sync message of kind `what` still waiting for its reply.
    pub(crate) fn take_pending_reply(&mut self, what: MsgWhat) -> Option<MsgId> {
        self.pending_replies.get_mut(&what)?.pop_front()
    }

    pub(crate) fn component(&self) -> CodecResult<Arc<dyn Component>> {
        self.component.clone().ok_or_else(|| {
            tracing::error!("no component allocated");
            CodecError::Unknown
        })
    }

    pub(crate) fn send_command(&self, cmd: CodecCommand) -> CodecResult {
        let component = self.component()?;
        component.send_command(cmd).map_err(|e| {
            tracing::error!("send {:?} failed: {}", cmd, e);
            CodecError::Unknown
        })
    }

    pub(crate) fn is_surface_input(&self) -> bool {
        self.direction == Direction::Encoder && self.enc.input_surface.is_some()
    }

    pub(crate) fn is_surface_output(&self) -> bool {
        self.direction == Direction::Decoder && self.dec.output_surface.is_some()
    }

    pub(crate) fn allocate_component(&mut self, name: &str) -> CodecResult {
        let callback = Arc::new(HdiCallback {
            handle: self.handle.downgrade(),
        });
        let (component, id) = self
            .ctx
            .manager
            .create_component(name, 0, callback)
            .map_err(|e| {
                tracing::error!("create component {} failed: {}", name, e);
                CodecError::Unknown
            })?;
        self.component = Some(component);
        self.component_id = id;
        self.component_name = name.to_string();
        tracing::info!("create omx node {} succ", name);
        Ok(())
    }

    /// Roll the component back, free every registered buffer and destroy it.
    pub(crate) fn release_component(&mut self) {
        let Some(component) = self.component.clone() else {
            return;
        };
        if self.roll_omx_back_to_loaded(component.as_ref()) {
            for port in [PortIndex::Input, PortIndex::Output] {
                for info in &self.pools[port.raw() as usize] {
                    if let Err(e) = component.free_buffer(port, &info.omx) {
                        tracing::warn!("free {} buffer {} failed: {}", port, info.id(), e);
                    }
                }
            }
        }
        self.pools = [Vec::new(), Vec::new()];
        if let Err(e) = self.ctx.manager.destroy_component(self.component_id) {
            tracing::warn!("destroy component {} failed: {}", self.component_id, e);
        }
        tracing::info!("released {}", self.component_name);
        self.component = None;
        self.component_id = 0;
        self.component_name.clear();
    }

    /// Walk the component down to Loaded, waiting for each step.
    pub(crate) fn roll_omx_back_to_loaded(&self, component: &dyn Component) -> bool {
        let state = match component.get_state() {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("get omx state failed ({}), cannot roll back", e);
                return false;
            }
        };
        tracing::info!("current omx state {:?}", state);
        if state == OmxState::Executing {
            change_omx_to_target_state(component, OmxState::Idle);
        }
        if matches!(state, OmxState::Executing | OmxState::Idle) {
            change_omx_to_target_state(component, OmxState::Loaded);
        }
        true
    }

    pub(crate) fn signal_error(&mut self, error_type: ErrorType, error: CodecError) {
        tracing::error!("fatal error: {:?} {}", error_type, error);
        self.has_fatal_error = true;
        if let Some(callback) = &self.callback {
            callback.on_error(error_type, error);
        }
    }

    /// Arm the stuck watchdog of the current state.
    pub(crate) fn arm_watchdog(&self) {
        self.handle
            .send_async(Msg::CheckIfStuck(self.generation), self.options.stuck_timeout);
    }

    pub(crate) fn arm_force_shutdown(&self) {
        self.handle
            .send_async(Msg::ForceShutdown(self.generation), self.options.stuck_timeout);
    }

    /// Drive the component to Idle and go to Stopping, skipping the
    /// graceful path. No-op if the state moved on since `generation`.
    pub(crate) fn force_shutdown(&mut self, generation: u64) {
        if generation != self.generation {
            tracing::error!(
                "ignoring stale force shutdown #{} (now #{})",
                generation,
                self.generation
            );
            return;
        }
        tracing::info!("force to shutdown");
        self.is_shut_down_from_running = true;
        self.notify_caller = false;
        self.keep_component_allocated = false;
        if self.send_command(CodecCommand::StateSet(OmxState::Idle)).is_ok() {
            self.change_state_to(StateId::Stopping);
        }
    }

    /// Write geometry and format of `port`, then refresh the cached format.
    pub(crate) fn set_video_port_info(&mut self, port: PortIndex, info: &PortInfo) -> CodecResult {
        let component = self.component()?;
        let x_framerate = q16_frame_rate(info.frame_rate)?;
        let query = PortDefinition {
            port,
            ..Default::default()
        };
        let mut def = component.get_param(query).map_err(|e| {
            tracing::error!("get {} port definition failed: {}", port, e);
            CodecError::Unknown
        })?;
        def.video.frame_width = info.width;
        def.video.frame_height = info.height;
        def.video.compression_format = info.coding;
        def.video.x_framerate = x_framerate;
        if port == PortIndex::Input {
            if let Some(size) = info.input_buf_size {
                def.buffer_size = size;
            }
        }
        component.set_param(&def).map_err(|e| {
            tracing::error!("set {} port definition failed: {}", port, e);
            CodecError::Unknown
        })?;

        let fmt = VideoPortFormat {
            port,
            compress_format: info.coding,
            color_format: info.pixel_fmt,
            framerate: x_framerate,
        };
        component.set_param(&fmt).map_err(|e| {
            tracing::error!("set {} port format failed: {}", port, e);
            CodecError::Unknown
        })?;
        match port {
            PortIndex::Input => self.update_in_port_format(),
            PortIndex::Output => self.update_out_port_format(),
        }
    }

    pub(crate) fn print_port_definition(def: &PortDefinition) {
        let video = &def.video;
        tracing::info!(
            "{} port: enabled {}, populated {}, count {}, size {}, {}x{} stride {} slice {}, \
             framerate {:.2}, compression {:?}, color {}",
            def.port,
            def.enabled,
            def.populated,
            def.buffer_count_actual,
            def.buffer_size,
            video.frame_width,
            video.frame_height,
            video.stride,
            video.slice_height,
            f64::from(video.x_framerate) / FRAME_RATE_COEFFICIENT,
            video.compression_format,
            video.color_format.0
        );
    }

    pub(crate) fn get_port_definition(&self, port: PortIndex) -> CodecResult<PortDefinition> {
        let component = self.component()?;
        let query = PortDefinition {
            port,
            ..Default::default()
        };
        let def = component.get_param(query).map_err(|e| {
            tracing::error!("get {} port definition failed: {}", port, e);
            CodecError::Unknown
        })?;
        Self::print_port_definition(&def);
        Ok(def)
    }

    pub(crate) fn on_configure(&mut self, format: &Format) -> CodecResult {
        match self.direction {
            Direction::Decoder => decoder::on_configure(self, format),
            Direction::Encoder => encoder::on_configure(self, format),
        }
    }

    pub(crate) fn update_in_port_format(&mut self) -> CodecResult {
        match self.direction {
            Direction::Decoder => decoder::update_in_port_format(self),
            Direction::Encoder => encoder::update_in_port_format(self),
        }
    }

    pub(crate) fn update_out_port_format(&mut self) -> CodecResult {
        match self.direction {
            Direction::Decoder => decoder::update_out_port_format(self),
            Direction::Encoder => encoder::update_out_port_format(self),
        }
    }

    pub(crate) fn ready_to_start(&mut self) -> bool {
        if self.callback.is_none() || self.input_format.is_none() || self.output_format.is_none() {
            return false;
        }
        if self.direction == Direction::Decoder {
            decoder::ready_to_start(self);
        }
        true
    }

    pub(crate) fn allocate_buffers_on_port(&mut self, port: PortIndex) -> CodecResult {
        match self.direction {
            Direction::Decoder => decoder::allocate_buffers_on_port(self, port),
            Direction::Encoder => encoder::allocate_buffers_on_port(self, port),
        }
    }

    /// Start circulation: output slots to the hardware, input slots to the
    /// user. Does nothing if buffers already circulate.
    pub(crate) fn submit_all_buffers_owned_by_us(&mut self) -> CodecResult {
        if self.buffers_circulating {
            tracing::info!("buffers already circulating");
            return Ok(());
        }
        self.submit_output_buffers()?;
        if !self.is_surface_input() {
            for idx in 0..self.pool(PortIndex::Input).len() {
                if self.pool(PortIndex::Input)[idx].owner == BufferOwner::Us {
                    self.notify_user_fill_input(idx);
                }
            }
        }
        self.buffers_circulating = true;
        if self.is_surface_input() {
            encoder::resume_surface_input(self);
        }
        Ok(())
    }

    pub(crate) fn submit_output_buffers(&mut self) -> CodecResult {
        for idx in 0..self.pool(PortIndex::Output).len() {
            let (id, owner) = {
                let info = &self.pool(PortIndex::Output)[idx];
                (info.id(), info.owner)
            };
            match owner {
                BufferOwner::Us => self.notify_omx_fill(idx)?,
                BufferOwner::Surface if self.is_surface_output() => {}
                owner => {
                    tracing::error!("output buffer {} is owned by {}", id, owner);
                    return Err(CodecError::Unknown);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn on_create_input_surface(&mut self) -> CodecResult<Arc<dyn Surface>> {
        match self.direction {
            Direction::Decoder => Err(CodecError::Unsupported),
            Direction::Encoder => encoder::on_create_input_surface(self),
        }
    }

    pub(crate) fn on_set_input_surface(&mut self, surface: Arc<dyn Surface>) -> CodecResult {
        match self.direction {
            Direction::Decoder => Err(CodecError::Unsupported),
            Direction::Encoder => encoder::on_set_input_surface(self, surface),
        }
    }

    pub(crate) fn on_set_output_surface(&mut self, surface: Arc<dyn Surface>) -> CodecResult {
        match self.direction {
            Direction::Decoder => decoder::on_set_output_surface(self, surface),
            Direction::Encoder => Err(CodecError::Unsupported),
        }
    }

    pub(crate) fn on_set_parameters(&mut self, format: &Format) -> CodecResult {
        match self.direction {
            Direction::Decoder => decoder::on_set_parameters(self, format),
            Direction::Encoder => encoder::on_set_parameters(self, format),
        }
    }

    pub(crate) fn request_idr_frame(&mut self) -> CodecResult {
        match self.direction {
            Direction::Decoder => Err(CodecError::Unsupported),
            Direction::Encoder => encoder::request_idr_frame(self),
        }
    }

    pub(crate) fn on_get_buffer_from_surface(&mut self) {
        match self.direction {
            Direction::Decoder => decoder::on_get_buffer_from_surface(self),
            Direction::Encoder => encoder::on_get_buffer_from_surface(self),
        }
    }

    pub(crate) fn on_omx_empty_buffer_done(
        &mut self,
        id: u32,
        mode: BufferOperationMode,
    ) {
        if self.is_surface_input() {
            encoder::on_surface_buffer_done(self, id, mode);
        } else {
            self.on_empty_buffer_done(id, mode);
        }
    }

    pub(crate) fn on_user_render_output_buffer(
        &mut self,
        id: u32,
        mode: BufferOperationMode,
    ) -> CodecResult {
        match self.direction {
            Direction::Decoder => decoder::on_user_render_output_buffer(self, id, mode),
            Direction::Encoder => Err(CodecError::Unsupported),
        }
    }

    pub(crate) fn on_signal_end_of_input_stream(&mut self) -> CodecResult {
        match self.direction {
            Direction::Decoder => Err(CodecError::Unsupported),
            Direction::Encoder => encoder::on_signal_end_of_input_stream(self),
        }
    }
}

/// Ask the component for `target` and poll until it gets there. Returns the
/// last observed state; `Invalid` if it never arrived.
fn change_omx_to_target_state(component: &dyn Component, target: OmxState) -> OmxState {
    if let Err(e) = component.send_command(CodecCommand::StateSet(target)) {
        tracing::error!("change omx state to {:?} failed: {}", target, e);
        return OmxState::Invalid;
    }
    let mut tries = 0;
    loop {
        if tries > OMX_STATE_POLL_TRIES {
            tracing::error!("omx did not reach {:?}, abort", target);
            return OmxState::Invalid;
        }
        tries += 1;
        thread::sleep(OMX_STATE_POLL_INTERVAL);
        match component.get_state() {
            Ok(state) if state == target || state == OmxState::Invalid => return state,
            Ok(_) => {}
            Err(e) => {
                tracing::error!("get omx state failed: {}", e);
                return OmxState::Invalid;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Decoder.to_string(), "decoder");
        assert_eq!(Direction::Encoder.to_string(), "encoder");
    }

    #[test]
    fn test_frame_rate_is_q16() {
        assert_eq!(q16_frame_rate(30.0), Ok(30 << 16));
        assert_eq!(q16_frame_rate(29.97), Ok(1_964_113));
    }

    #[test]
    fn test_frame_rate_out_of_range() {
        assert_eq!(q16_frame_rate(0.0), Err(CodecError::InvalidVal));
        assert_eq!(q16_frame_rate(-1.0), Err(CodecError::InvalidVal));
        assert_eq!(q16_frame_rate(f64::NAN), Err(CodecError::InvalidVal));
        assert_eq!(q16_frame_rate(f64::INFINITY), Err(CodecError::InvalidVal));
        assert_eq!(q16_frame_rate(70_000.0), Err(CodecError::InvalidVal));
        assert_eq!(q16_frame_rate(65_535.0), Ok(65_535 << 16));
    }
}
