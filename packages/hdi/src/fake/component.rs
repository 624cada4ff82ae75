//! Fake component manager and component.
//!
//! Each component runs a worker thread that applies commands and produces
//! one output frame per input buffer, reporting completions through the
//! registered [`ComponentCallback`] just like a hardware driver would.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::{
    AvcParams, BitRateMode, BufferHandleUsage, CodecCommand, CodecCompCapability, CodecEvent,
    CodecRole, CodecType, CodingType, CommandKind, Component, ComponentCallback,
    ComponentManager, GraphicPixelFormat, HdiError, HdiProfile, HdiResult, HevcParams,
    OmxCodecBuffer, OmxColorFormat, OmxState, OutputCrop, Param, ParamIndex, PortDefinition,
    PortIndex, RangeValue, Size, VideoPortCap, VideoPortDefinition, VideoPortFormat,
    BUFFER_FLAG_CODECCONFIG, BUFFER_FLAG_EOS, BUFFER_FLAG_SYNCFRAME, BUFFER_USAGE_CPU_READ,
    BUFFER_USAGE_CPU_WRITE, BUFFER_USAGE_MEM_DMA,
};

pub const FAKE_AVC_DECODER: &str = "OMX.fake.video.decoder.avc";
pub const FAKE_HEVC_DECODER: &str = "OMX.fake.video.decoder.hevc";
pub const FAKE_AVC_ENCODER: &str = "OMX.fake.video.encoder.avc";
pub const FAKE_HEVC_ENCODER: &str = "OMX.fake.video.encoder.hevc";

/// Live instances allowed per component name.
pub const FAKE_MAX_INSTANCES: u32 = 16;

const BUFFER_COUNT: u32 = 4;
const DEFAULT_INPUT_BUFFER_SIZE: u32 = 256 * 1024;
const MIN_BITSTREAM_BUFFER_SIZE: u32 = 4096;
const KEY_FRAME_PERIOD: u64 = 30;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn capability(name: &str, role: CodecRole, codec_type: CodecType) -> CodecCompCapability {
    let profiles = match role {
        CodecRole::VideoHevc => vec![HdiProfile::HevcMain, HdiProfile::HevcMain10],
        _ => vec![
            HdiProfile::AvcBaseline,
            HdiProfile::AvcMain,
            HdiProfile::AvcHigh,
        ],
    };
    let bit_rate_modes = match codec_type {
        CodecType::VideoEncoder => vec![BitRateMode::Cbr, BitRateMode::Vbr, BitRateMode::Cq],
        _ => Vec::new(),
    };
    CodecCompCapability {
        role,
        codec_type,
        comp_name: name.to_string(),
        supported_profiles: profiles,
        max_inst: FAKE_MAX_INSTANCES,
        is_software: false,
        bit_rate: RangeValue::new(1, 40_000_000),
        can_swap_width_height: false,
        port: VideoPortCap {
            min_size: Size { width: 32, height: 32 },
            max_size: Size { width: 4096, height: 2304 },
            width_alignment: 2,
            height_alignment: 2,
            block_count: RangeValue::new(1, 36_864),
            blocks_per_second: RangeValue::new(1, 1_105_920),
            block_size: Size { width: 16, height: 16 },
            supported_pix_fmts: vec![
                GraphicPixelFormat::Ycbcr420Sp.raw(),
                GraphicPixelFormat::Ycbcr420P.raw(),
                GraphicPixelFormat::Rgba8888.raw(),
            ],
            bit_rate_modes,
            frame_rate: RangeValue::new(1, 120),
            measured_frame_rate: vec![1920, 1080, 30, 60, 3840, 2160, 15, 30],
        },
    }
}

/// Component manager offering AVC/HEVC decoders and encoders.
pub struct FakeComponentManager {
    caps: Vec<CodecCompCapability>,
    live: Mutex<Live>,
}

#[derive(Default)]
struct Live {
    next_id: u32,
    components: Vec<(u32, Arc<FakeComponent>)>,
}

impl FakeComponentManager {
    /// Manager with the four default video components.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(vec![
            capability(FAKE_AVC_DECODER, CodecRole::VideoAvc, CodecType::VideoDecoder),
            capability(FAKE_HEVC_DECODER, CodecRole::VideoHevc, CodecType::VideoDecoder),
            capability(FAKE_AVC_ENCODER, CodecRole::VideoAvc, CodecType::VideoEncoder),
            capability(FAKE_HEVC_ENCODER, CodecRole::VideoHevc, CodecType::VideoEncoder),
        ])
    }

    /// Manager advertising exactly `caps`.
    #[must_use]
    pub fn with_capabilities(caps: Vec<CodecCompCapability>) -> Self {
        Self {
            caps,
            live: Mutex::new(Live::default()),
        }
    }

    /// Number of live instances of `name`.
    #[must_use]
    pub fn live_instances(&self, name: &str) -> usize {
        lock(&self.live)
            .components
            .iter()
            .filter(|(_, c)| c.name() == name)
            .count()
    }

    /// Most recently created live component.
    #[must_use]
    pub fn last_component(&self) -> Option<Arc<FakeComponent>> {
        lock(&self.live).components.last().map(|(_, c)| c.clone())
    }
}

impl Default for FakeComponentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentManager for FakeComponentManager {
    fn component_capability_list(&self) -> HdiResult<Vec<CodecCompCapability>> {
        Ok(self.caps.clone())
    }

    fn create_component(
        &self,
        name: &str,
        app_data: i64,
        callback: Arc<dyn ComponentCallback>,
    ) -> HdiResult<(Arc<dyn Component>, u32)> {
        let cap = self
            .caps
            .iter()
            .find(|c| c.comp_name == name)
            .ok_or(HdiError::InvalidParam)?;
        let mut live = lock(&self.live);
        let count = live.components.iter().filter(|(_, c)| c.name() == name).count();
        if count >= cap.max_inst as usize {
            tracing::warn!("{}: {} instances already alive", name, count);
            return Err(HdiError::InstanceLimit);
        }
        live.next_id += 1;
        let id = live.next_id;
        let component = Arc::new(FakeComponent::new(cap, app_data, callback));
        live.components.push((id, component.clone()));
        tracing::debug!("created {} as component {}", name, id);
        Ok((component, id))
    }

    fn destroy_component(&self, component_id: u32) -> HdiResult {
        let component = {
            let mut live = lock(&self.live);
            let pos = live
                .components
                .iter()
                .position(|(id, _)| *id == component_id)
                .ok_or(HdiError::InvalidParam)?;
            live.components.remove(pos).1
        };
        component.shutdown();
        tracing::debug!("destroyed component {}", component_id);
        Ok(())
    }
}

enum Task {
    Command(CodecCommand),
    Empty(OmxCodecBuffer),
    Fill(OmxCodecBuffer),
    Event(CodecEvent),
}

enum Notify {
    Event(CodecEvent),
    EmptyDone(OmxCodecBuffer),
    FillDone(OmxCodecBuffer),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PortPending {
    Disable,
    Enable,
}

struct Port {
    def: PortDefinition,
    color: GraphicPixelFormat,
    registered: Vec<u32>,
    held: VecDeque<OmxCodecBuffer>,
    pending: Option<PortPending>,
}

impl Port {
    fn new(port: PortIndex, compression: CodingType, color: GraphicPixelFormat) -> Self {
        let buffer_size = if port == PortIndex::Input && compression != CodingType::Unused {
            DEFAULT_INPUT_BUFFER_SIZE
        } else {
            0
        };
        Self {
            def: PortDefinition {
                port,
                enabled: true,
                populated: false,
                buffer_count_actual: BUFFER_COUNT,
                buffer_count_min: 2,
                buffer_size,
                video: VideoPortDefinition {
                    compression_format: compression,
                    color_format: omx_color(color),
                    ..Default::default()
                },
            },
            color,
            registered: Vec::new(),
            held: VecDeque::new(),
            pending: None,
        }
    }

    /// Recompute stride and buffer size after a geometry change.
    fn recompute(&mut self) {
        let video = &mut self.def.video;
        let stride = (video.frame_width + 15) & !15;
        video.stride = i32::try_from(stride).unwrap_or(i32::MAX);
        video.slice_height = video.frame_height;
        let raw = u32::try_from(self.color.frame_size(stride, video.frame_height)).unwrap_or(0);
        if video.compression_format == CodingType::Unused {
            if self.def.port == PortIndex::Output || self.def.buffer_size == 0 {
                self.def.buffer_size = raw;
            }
        } else if self.def.port == PortIndex::Output {
            let pixels = video.frame_width.saturating_mul(video.frame_height);
            self.def.buffer_size = (pixels / 2).max(MIN_BITSTREAM_BUFFER_SIZE);
        }
    }
}

fn omx_color(fmt: GraphicPixelFormat) -> OmxColorFormat {
    match fmt {
        GraphicPixelFormat::Ycbcr420Sp => OmxColorFormat::YUV420_SEMI_PLANAR,
        GraphicPixelFormat::Ycbcr420P => OmxColorFormat::YUV420_PLANAR,
        _ => OmxColorFormat::UNUSED,
    }
}

struct State {
    omx_state: OmxState,
    is_encoder: bool,
    coding: CodingType,
    ports: [Port; 2],
    avc: AvcParams,
    hevc: HevcParams,
    applied: Vec<Param>,
    next_buffer_id: u32,
    tasks: VecDeque<Task>,
    pending_inputs: VecDeque<OmxCodecBuffer>,
    frozen: bool,
    /// Output geometry the next flush switches to.
    resize_on_flush: Option<(u32, u32)>,
    stopped: bool,
    frames_out: u64,
}

impl State {
    fn port(&mut self, port: PortIndex) -> &mut Port {
        &mut self.ports[port.raw() as usize]
    }

    fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    fn resize_output(&mut self, width: u32, height: u32) -> CodecEvent {
        let port = self.port(PortIndex::Output);
        port.def.video.frame_width = width;
        port.def.video.frame_height = height;
        port.recompute();
        CodecEvent::PortSettingsChanged {
            port: PortIndex::Output.raw(),
            index: ParamIndex::PortDefinition.raw(),
        }
    }

    fn process(&mut self, task: Task) -> Vec<Notify> {
        match task {
            Task::Command(cmd) if self.frozen => {
                tracing::debug!("frozen, dropping {:?}", cmd);
                Vec::new()
            }
            Task::Command(cmd) => self.run_command(cmd),
            Task::Empty(buffer) => {
                if !self.is_encoder && buffer.flag & BUFFER_FLAG_CODECCONFIG != 0 {
                    return vec![Notify::EmptyDone(buffer)];
                }
                self.pending_inputs.push_back(buffer);
                self.process_frames()
            }
            Task::Fill(buffer) => {
                self.port(PortIndex::Output).held.push_back(buffer);
                self.process_frames()
            }
            Task::Event(event) => vec![Notify::Event(event)],
        }
    }

    fn run_command(&mut self, cmd: CodecCommand) -> Vec<Notify> {
        let mut out = Vec::new();
        match cmd {
            CodecCommand::StateSet(target) => {
                if target == OmxState::Idle && self.omx_state == OmxState::Executing {
                    out.extend(self.return_held(PortIndex::Input));
                    out.extend(self.return_held(PortIndex::Output));
                }
                self.omx_state = target;
            }
            CodecCommand::Flush(raw) => {
                if let Some((width, height)) = self.resize_on_flush.take() {
                    out.push(Notify::Event(self.resize_output(width, height)));
                }
                let ports: Vec<PortIndex> = match PortIndex::from_raw(raw) {
                    Some(port) => vec![port],
                    None => vec![PortIndex::Input, PortIndex::Output],
                };
                for port in ports {
                    out.extend(self.return_held(port));
                    out.push(Notify::Event(CodecEvent::CmdComplete {
                        cmd: CommandKind::Flush,
                        data: port.raw(),
                    }));
                }
                if raw != PortIndex::ALL {
                    return out;
                }
            }
            CodecCommand::PortDisable(raw) => {
                let Some(port) = PortIndex::from_raw(raw) else {
                    return vec![Notify::Event(CodecEvent::Error { code: -1 })];
                };
                out.extend(self.return_held(port));
                let p = self.port(port);
                p.def.enabled = false;
                if !p.registered.is_empty() {
                    p.pending = Some(PortPending::Disable);
                    return out;
                }
            }
            CodecCommand::PortEnable(raw) => {
                let Some(port) = PortIndex::from_raw(raw) else {
                    return vec![Notify::Event(CodecEvent::Error { code: -1 })];
                };
                let p = self.port(port);
                p.def.enabled = true;
                if p.registered.len() < p.def.buffer_count_actual as usize {
                    p.pending = Some(PortPending::Enable);
                    return out;
                }
            }
        }
        out.push(Notify::Event(CodecEvent::CmdComplete {
            cmd: cmd.kind(),
            data: cmd.param(),
        }));
        out
    }

    fn return_held(&mut self, port: PortIndex) -> Vec<Notify> {
        let mut out = Vec::new();
        if port == PortIndex::Input {
            while let Some(buffer) = self.pending_inputs.pop_front() {
                out.push(Notify::EmptyDone(buffer));
            }
        }
        while let Some(mut buffer) = self.port(port).held.pop_front() {
            match port {
                PortIndex::Input => out.push(Notify::EmptyDone(buffer)),
                PortIndex::Output => {
                    buffer.filled_len = 0;
                    buffer.flag = 0;
                    out.push(Notify::FillDone(buffer));
                }
            }
        }
        out
    }

    fn process_frames(&mut self) -> Vec<Notify> {
        let mut out = Vec::new();
        while self.omx_state == OmxState::Executing
            && self.ports[1].def.enabled
            && !self.pending_inputs.is_empty()
            && !self.ports[1].held.is_empty()
        {
            let (Some(input), Some(mut output)) = (
                self.pending_inputs.pop_front(),
                self.ports[1].held.pop_front(),
            ) else {
                break;
            };
            let len = if input.filled_len == 0 {
                0
            } else {
                self.frame_len(&input, &output)
            };
            if len > 0 {
                let header = input.pts.to_le_bytes();
                if let Some(memory) = &output.memory {
                    memory.write_at(0, &header);
                } else if let Some(handle) = &output.handle {
                    handle.memory().write_at(0, &header);
                }
            }
            output.offset = 0;
            output.filled_len = len;
            output.pts = input.pts;
            output.flag = input.flag & BUFFER_FLAG_EOS;
            if len > 0 {
                if !self.is_encoder || self.frames_out % KEY_FRAME_PERIOD == 0 {
                    output.flag |= BUFFER_FLAG_SYNCFRAME;
                }
                self.frames_out += 1;
            }
            out.push(Notify::EmptyDone(input));
            out.push(Notify::FillDone(output));
        }
        out
    }

    fn frame_len(&self, input: &OmxCodecBuffer, output: &OmxCodecBuffer) -> u32 {
        let capacity = match (&output.memory, &output.handle) {
            (Some(memory), _) => u32::try_from(memory.size()).unwrap_or(u32::MAX),
            (None, Some(handle)) => u32::try_from(handle.memory().size()).unwrap_or(u32::MAX),
            (None, None) => output.alloc_len,
        };
        let wanted = if self.is_encoder {
            input.filled_len / 8 + 64
        } else {
            self.ports[1].def.buffer_size
        };
        wanted.min(capacity).max(1)
    }

    fn apply_port_definition(&mut self, def: &PortDefinition) {
        let port = self.port(def.port);
        port.def.video.frame_width = def.video.frame_width;
        port.def.video.frame_height = def.video.frame_height;
        port.def.video.compression_format = def.video.compression_format;
        port.def.video.x_framerate = def.video.x_framerate;
        port.recompute();
        if def.port == PortIndex::Input && def.buffer_size != 0 {
            port.def.buffer_size = def.buffer_size;
        }
    }

    fn complete_port(&mut self, port: PortIndex) {
        let p = self.port(port);
        let done = match p.pending {
            Some(PortPending::Disable) => p.registered.is_empty(),
            Some(PortPending::Enable) => p.registered.len() >= p.def.buffer_count_actual as usize,
            None => false,
        };
        if !done {
            return;
        }
        let cmd = match p.pending.take() {
            Some(PortPending::Disable) => CommandKind::PortDisable,
            _ => CommandKind::PortEnable,
        };
        self.push(Task::Event(CodecEvent::CmdComplete {
            cmd,
            data: port.raw(),
        }));
    }
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
    callback: Arc<dyn ComponentCallback>,
    app_data: i64,
}

/// In-process stand-in for a hardware codec component.
pub struct FakeComponent {
    name: String,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FakeComponent {
    fn new(cap: &CodecCompCapability, app_data: i64, callback: Arc<dyn ComponentCallback>) -> Self {
        let is_encoder = cap.codec_type == CodecType::VideoEncoder;
        let coding = match cap.role {
            CodecRole::VideoHevc => CodingType::Hevc,
            _ => CodingType::Avc,
        };
        let (input, output) = if is_encoder {
            (
                Port::new(PortIndex::Input, CodingType::Unused, GraphicPixelFormat::Ycbcr420Sp),
                Port::new(PortIndex::Output, coding, GraphicPixelFormat::Butt),
            )
        } else {
            (
                Port::new(PortIndex::Input, coding, GraphicPixelFormat::Butt),
                Port::new(PortIndex::Output, CodingType::Unused, GraphicPixelFormat::Ycbcr420Sp),
            )
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                omx_state: OmxState::Loaded,
                is_encoder,
                coding,
                ports: [input, output],
                avc: AvcParams {
                    port: PortIndex::Output,
                    ..Default::default()
                },
                hevc: HevcParams {
                    port: PortIndex::Output,
                    ..Default::default()
                },
                applied: Vec::new(),
                next_buffer_id: 0,
                tasks: VecDeque::new(),
                pending_inputs: VecDeque::new(),
                frozen: false,
                resize_on_flush: None,
                stopped: false,
                frames_out: 0,
            }),
            cond: Condvar::new(),
            callback,
            app_data,
        });
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(format!("fake-omx-{}", cap.comp_name))
            .spawn(move || run_worker(&worker_shared))
            .map_err(|e| tracing::error!("failed to spawn fake component worker: {}", e))
            .ok();
        Self {
            name: cap.comp_name.clone(),
            shared,
            worker: Mutex::new(worker),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current component state.
    #[must_use]
    pub fn omx_state(&self) -> OmxState {
        self.lock().omx_state
    }

    /// Every parameter and config successfully set so far, in order.
    #[must_use]
    pub fn applied_params(&self) -> Vec<Param> {
        self.lock().applied.clone()
    }

    /// Whether a parameter of kind `index` was successfully set.
    #[must_use]
    pub fn was_applied(&self, index: ParamIndex) -> bool {
        self.lock().applied.iter().any(|p| p.index() == index)
    }

    /// Buffers currently registered on `port`.
    #[must_use]
    pub fn registered_buffers(&self, port: PortIndex) -> usize {
        self.lock().port(port).registered.len()
    }

    /// Stop completing commands, simulating a hung driver.
    pub fn freeze(&self) {
        self.lock().frozen = true;
    }

    /// Change the output geometry and raise a port-settings-changed event.
    pub fn trigger_port_settings_changed(&self, width: u32, height: u32) {
        let mut state = self.lock();
        let event = state.resize_output(width, height);
        state.push(Task::Event(event));
        self.shared.cond.notify_all();
    }

    /// Change the output geometry in the middle of the next flush, before
    /// the flush completes.
    pub fn change_output_on_next_flush(&self, width: u32, height: u32) {
        self.lock().resize_on_flush = Some((width, height));
    }

    /// Raise an error event.
    pub fn trigger_error(&self, code: i32) {
        self.lock().push(Task::Event(CodecEvent::Error { code }));
        self.shared.cond.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.shared.state)
    }

    fn enqueue(&self, task: Task) {
        self.lock().push(task);
        self.shared.cond.notify_all();
    }

    pub(crate) fn shutdown(&self) {
        self.lock().stopped = true;
        self.shared.cond.notify_all();
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("{}: worker panicked", self.name);
            }
        }
    }
}

impl Drop for FakeComponent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared) {
    loop {
        let notifications = {
            let mut state = lock(&shared.state);
            while state.tasks.is_empty() && !state.stopped {
                state = shared
                    .cond
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.stopped {
                return;
            }
            match state.tasks.pop_front() {
                Some(task) => state.process(task),
                None => continue,
            }
        };
        for notification in notifications {
            match notification {
                Notify::Event(event) => shared.callback.event_handler(event),
                Notify::EmptyDone(buffer) => {
                    shared.callback.empty_buffer_done(shared.app_data, &buffer);
                }
                Notify::FillDone(buffer) => {
                    shared.callback.fill_buffer_done(shared.app_data, &buffer);
                }
            }
        }
    }
}

impl Component for FakeComponent {
    fn send_command(&self, cmd: CodecCommand) -> HdiResult {
        tracing::debug!("{}: command {:?}", self.name, cmd);
        self.enqueue(Task::Command(cmd));
        Ok(())
    }

    fn get_state(&self) -> HdiResult<OmxState> {
        Ok(self.omx_state())
    }

    fn get_parameter(&self, query: Param) -> HdiResult<Param> {
        let mut state = self.lock();
        match query {
            Param::PortDefinition(q) => Ok(Param::PortDefinition(state.port(q.port).def)),
            Param::VideoPortFormat(q) => {
                let port = state.port(q.port);
                Ok(Param::VideoPortFormat(VideoPortFormat {
                    port: q.port,
                    compress_format: port.def.video.compression_format,
                    color_format: port.color,
                    framerate: port.def.video.x_framerate,
                }))
            }
            Param::BufferHandleUsage(q) => Ok(Param::BufferHandleUsage(BufferHandleUsage {
                port: q.port,
                usage: BUFFER_USAGE_CPU_READ | BUFFER_USAGE_CPU_WRITE | BUFFER_USAGE_MEM_DMA,
            })),
            Param::VideoAvc(_) if state.is_encoder && state.coding == CodingType::Avc => {
                Ok(Param::VideoAvc(state.avc))
            }
            Param::VideoHevc(_) if state.is_encoder && state.coding == CodingType::Hevc => {
                Ok(Param::VideoHevc(state.hevc))
            }
            _ => Err(HdiError::NotSupported),
        }
    }

    fn set_parameter(&self, param: Param) -> HdiResult {
        let mut state = self.lock();
        match &param {
            Param::PortDefinition(def) => state.apply_port_definition(def),
            Param::VideoPortFormat(fmt) => {
                let port = state.port(fmt.port);
                port.color = fmt.color_format;
                port.def.video.color_format = omx_color(fmt.color_format);
                port.def.video.x_framerate = fmt.framerate;
                port.recompute();
            }
            Param::UseBufferType(_) => {}
            Param::VideoBitrate(_) | Param::ConstantQuality(_) if state.is_encoder => {}
            Param::VideoAvc(avc) if state.is_encoder && state.coding == CodingType::Avc => {
                state.avc = *avc;
            }
            Param::VideoHevc(hevc) if state.is_encoder && state.coding == CodingType::Hevc => {
                state.hevc = *hevc;
            }
            _ => return Err(HdiError::NotSupported),
        }
        state.applied.push(param);
        Ok(())
    }

    fn get_config(&self, query: Param) -> HdiResult<Param> {
        let mut state = self.lock();
        match query {
            Param::OutputCrop(q) => {
                let video = state.port(q.port).def.video;
                Ok(Param::OutputCrop(OutputCrop {
                    port: q.port,
                    left: 0,
                    top: 0,
                    width: video.frame_width,
                    height: video.frame_height,
                }))
            }
            _ => Err(HdiError::NotSupported),
        }
    }

    fn set_config(&self, param: Param) -> HdiResult {
        let mut state = self.lock();
        match &param {
            Param::ColorAspects(_) | Param::IntraRefreshVop(_) if state.is_encoder => {}
            _ => return Err(HdiError::NotSupported),
        }
        state.applied.push(param);
        Ok(())
    }

    fn use_buffer(&self, port: PortIndex, mut buffer: OmxCodecBuffer) -> HdiResult<OmxCodecBuffer> {
        let mut state = self.lock();
        state.next_buffer_id += 1;
        buffer.buffer_id = state.next_buffer_id;
        let p = state.port(port);
        p.registered.push(buffer.buffer_id);
        p.def.populated = p.registered.len() >= p.def.buffer_count_actual as usize;
        state.complete_port(port);
        drop(state);
        self.shared.cond.notify_all();
        Ok(buffer)
    }

    fn free_buffer(&self, port: PortIndex, buffer: &OmxCodecBuffer) -> HdiResult {
        let mut state = self.lock();
        let p = state.port(port);
        let pos = p
            .registered
            .iter()
            .position(|id| *id == buffer.buffer_id)
            .ok_or(HdiError::InvalidParam)?;
        p.registered.remove(pos);
        p.held.retain(|b| b.buffer_id != buffer.buffer_id);
        p.def.populated = false;
        state.complete_port(port);
        drop(state);
        self.shared.cond.notify_all();
        Ok(())
    }

    fn empty_this_buffer(&self, buffer: &OmxCodecBuffer) -> HdiResult {
        let mut state = self.lock();
        if !matches!(state.omx_state, OmxState::Idle | OmxState::Executing) {
            return Err(HdiError::InvalidState);
        }
        if !state.port(PortIndex::Input).registered.contains(&buffer.buffer_id) {
            return Err(HdiError::InvalidParam);
        }
        state.push(Task::Empty(buffer.clone()));
        drop(state);
        self.shared.cond.notify_all();
        Ok(())
    }

    fn fill_this_buffer(&self, buffer: &OmxCodecBuffer) -> HdiResult {
        let mut state = self.lock();
        if !matches!(state.omx_state, OmxState::Idle | OmxState::Executing) {
            return Err(HdiError::InvalidState);
        }
        if !state.port(PortIndex::Output).registered.contains(&buffer.buffer_id) {
            return Err(HdiError::InvalidParam);
        }
        state.push(Task::Fill(buffer.clone()));
        drop(state);
        self.shared.cond.notify_all();
        Ok(())
    }
}
