//! The seven lifecycle states and their message handlers.
//!
//! ```text
//! Uninitialized --Init--> Initialized --Start--> Starting --Executing--> Running
//!                              ^                    |                    |  ^  |
//!                              |                 (error)      (port change) | (flush)
//!                              |                    v                    v  |  v
//!                              +-----------<--------+      OutputPortChanged  Flushing
//!                              |                                            |
//!                              +---Loaded--- Stopping <--Stop/Release-------+
//! ```
//!
//! Each state handles what it understands and hands the rest to
//! [`Codec::on_common_msg`]. Messages a state cannot handle yet are deferred
//! and replayed, in order, by the next state that can.

use std::fmt;

use hcodec_hdi::{CodecCommand, CodecEvent, CommandKind, OmxState, ParamIndex, PortIndex};

use super::buffer::{BufferOperationMode, BufferOwner};
use super::codec::{Codec, DecoderContext, EncoderContext};
use super::encoder;
use super::msg::{Msg, MsgWhat, Reply};
use crate::msg_loop::{MsgHandler, MsgId, MsgInfo};
use crate::state_machine::StateMachine;
use crate::{CodecError, ErrorType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum StateId {
    Uninitialized,
    Initialized,
    Starting,
    Running,
    OutputPortChanged,
    Flushing,
    Stopping,
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl StateId {
    /// What happens to `(input, output)` buffers the hardware hands back.
    pub(crate) const fn modes(self) -> (BufferOperationMode, BufferOperationMode) {
        use BufferOperationMode::{Free, Keep, Resubmit};
        match self {
            Self::Running => (Resubmit, Resubmit),
            Self::OutputPortChanged => (Resubmit, Free),
            Self::Uninitialized
            | Self::Initialized
            | Self::Starting
            | Self::Flushing
            | Self::Stopping => (Keep, Keep),
        }
    }

    fn input_mode(self) -> BufferOperationMode {
        self.modes().0
    }

    fn output_mode(self) -> BufferOperationMode {
        self.modes().1
    }
}

impl StateMachine for Codec {
    type State = StateId;

    fn current_state(&self) -> Option<StateId> {
        self.state
    }

    fn set_current_state(&mut self, state: StateId) {
        self.state = Some(state);
    }

    fn on_state_entered(&mut self, state: StateId) {
        match state {
            StateId::Uninitialized => {
                self.release_component();
                self.forget_configuration();
            }
            StateId::Initialized => self.on_initialized_entered(),
            StateId::Starting => self.on_starting_entered(),
            StateId::Running => self.process_deferred_messages(),
            StateId::OutputPortChanged => self.arm_watchdog(),
            StateId::Flushing => self.on_flushing_entered(),
            StateId::Stopping => self.on_stopping_entered(),
        }
    }

    fn on_state_exited(&mut self, state: StateId) {
        self.generation += 1;
        if state == StateId::Starting && self.starting_has_error {
            self.roll_back_after_failed_start();
        }
    }
}

impl MsgHandler<Msg> for Codec {
    fn on_msg_received(&mut self, info: MsgInfo<Msg>) {
        let Some(state) = self.state else {
            tracing::error!("no state, drop {}", info.msg.what());
            if info.is_sync() {
                self.reply_status(info.id, Err(CodecError::InvalidState));
            }
            return;
        };
        tracing::trace!("{} receives {}", state, info.msg.what());
        match state {
            StateId::Uninitialized => self.uninitialized_on_msg(info),
            StateId::Initialized => self.initialized_on_msg(info),
            StateId::Starting => self.starting_on_msg(info),
            StateId::Running => self.running_on_msg(info),
            StateId::OutputPortChanged => self.output_port_changed_on_msg(info),
            StateId::Flushing => self.flushing_on_msg(info),
            StateId::Stopping => self.stopping_on_msg(info),
        }
    }
}

/// Driver buffer-done and format queries, shared by every state.
impl Codec {
    fn current(&self) -> StateId {
        self.state.unwrap_or(StateId::Uninitialized)
    }

    fn on_common_msg(&mut self, info: MsgInfo<Msg>) {
        let MsgInfo { msg, id } = info;
        let state = self.current();
        match msg {
            Msg::CodecEvent(event) => self.on_codec_event(event),
            Msg::EmptyBufferDone(buffer_id) => {
                self.on_omx_empty_buffer_done(buffer_id, state.input_mode());
            }
            Msg::FillBufferDone(buffer) => self.on_fill_buffer_done(&buffer, state.output_mode()),
            Msg::GetInputFormat => self.reply_format(id, self.input_format.clone()),
            Msg::GetOutputFormat => self.reply_format(id, self.output_format.clone()),
            Msg::GetBufferFromSurface if self.is_surface_input() => {
                self.on_get_buffer_from_surface();
            }
            msg @ (Msg::Stop | Msg::Release) => self.on_shutdown(MsgInfo { msg, id }),
            msg => {
                tracing::warn!("ignore {} in {}", msg.what(), state);
                self.reply_status(id, Err(CodecError::InvalidState));
            }
        }
    }

    fn reply_format(&self, id: MsgId, format: Option<crate::Format>) {
        self.reply(id, Reply::Format(format.ok_or(CodecError::Unknown)));
    }

    fn on_codec_event(&mut self, event: CodecEvent) {
        let state = self.current();
        match event {
            CodecEvent::CmdComplete {
                cmd: CommandKind::Flush,
                data: PortIndex::ALL,
            } => tracing::debug!("ignore flush all complete event"),
            CodecEvent::CmdComplete { cmd, data } => match state {
                StateId::Starting => self.starting_on_cmd_complete(cmd, data),
                StateId::OutputPortChanged => self.output_port_changed_on_cmd_complete(cmd, data),
                StateId::Flushing => self.flushing_on_cmd_complete(cmd, data),
                StateId::Stopping => self.stopping_on_cmd_complete(cmd, data),
                _ => tracing::warn!("ignore {:?} complete ({}) in {}", cmd, data, state),
            },
            CodecEvent::PortSettingsChanged { port, index } => match state {
                StateId::Running => self.running_on_port_settings_changed(port, index),
                StateId::Flushing => {
                    tracing::info!("deferring port settings changed");
                    self.defer(MsgInfo {
                        msg: Msg::CodecEvent(event),
                        id: 0,
                    });
                }
                _ => tracing::warn!("ignore port settings changed in {}", state),
            },
            CodecEvent::Error { code } => {
                tracing::error!("omx report error event, code = {}", code);
                self.signal_error(ErrorType::Internal, CodecError::ServiceDied);
            }
        }
    }

    fn on_shutdown(&mut self, info: MsgInfo<Msg>) {
        match self.current() {
            StateId::Uninitialized => self.reply_status(info.id, Ok(())),
            StateId::Initialized => {
                if matches!(info.msg, Msg::Release) {
                    self.change_state_to(StateId::Uninitialized);
                }
                self.notify_caller = false;
                self.reply_status(info.id, Ok(()));
            }
            StateId::Running => self.running_on_shutdown(info),
            StateId::OutputPortChanged | StateId::Flushing => {
                if self.has_fatal_error {
                    self.arm_force_shutdown();
                }
                self.defer(info);
            }
            StateId::Starting | StateId::Stopping => self.defer(info),
        }
    }

    fn reply_get_input_buffer(&self, id: MsgId, buffer_id: u32) {
        self.reply(id, Reply::Memory(self.on_user_get_input_buffer(buffer_id)));
    }

    fn reply_get_output_buffer(&self, id: MsgId, buffer_id: u32) {
        self.reply(id, Reply::Memory(self.on_user_get_output_buffer(buffer_id)));
    }
}

/// Uninitialized: no component.
impl Codec {
    /// Drop everything set up after `Init`. The callback stays registered.
    fn forget_configuration(&mut self) {
        self.config_format = None;
        self.input_format = None;
        self.output_format = None;
        self.shared_buffer_format = None;
        self.dec = DecoderContext::default();
        self.enc = EncoderContext::default();
        self.buffers_circulating = false;
        self.has_fatal_error = false;
        self.input_eos = false;
        self.output_eos = false;
    }

    fn uninitialized_on_msg(&mut self, info: MsgInfo<Msg>) {
        let MsgInfo { msg, id } = info;
        match msg {
            Msg::Init(name) => {
                let result = self.allocate_component(&name);
                let ok = result.is_ok();
                self.reply_status(id, result);
                if ok {
                    self.change_state_to(StateId::Initialized);
                }
            }
            msg => self.on_common_msg(MsgInfo { msg, id }),
        }
    }
}

/// Initialized: component in Loaded, accepting configuration.
impl Codec {
    fn on_initialized_entered(&mut self) {
        self.input_eos = false;
        self.output_eos = false;
        self.input_format = None;
        self.output_format = None;
        self.shared_buffer_format = None;
        self.process_shut_down_from_running();
        self.notify_caller = false;
        self.process_deferred_messages();
    }

    fn process_shut_down_from_running(&mut self) {
        if !self.is_shut_down_from_running {
            return;
        }
        let keep = self.keep_component_allocated;
        if keep {
            if let Some(config) = self.config_format.clone() {
                if let Err(e) = self.on_configure(&config) {
                    tracing::warn!("reconfigure after stop failed: {}", e);
                }
            }
        } else {
            self.change_state_to(StateId::Uninitialized);
        }
        if self.notify_caller {
            let what = if keep { MsgWhat::Stop } else { MsgWhat::Release };
            if let Some(id) = self.take_pending_reply(what) {
                self.reply_status(id, Ok(()));
            }
        }
        self.is_shut_down_from_running = false;
        self.keep_component_allocated = false;
    }

    fn initialized_on_msg(&mut self, info: MsgInfo<Msg>) {
        let MsgInfo { msg, id } = info;
        match msg {
            Msg::SetCallback(callback) => {
                self.callback = Some(callback);
                self.reply_status(id, Ok(()));
            }
            Msg::Configure(format) => {
                let result = self.on_configure(&format);
                self.reply_status(id, result);
            }
            Msg::CreateInputSurface => {
                let result = self.on_create_input_surface();
                self.reply(id, Reply::Surface(result));
            }
            Msg::SetInputSurface(surface) => {
                let result = self.on_set_input_surface(surface);
                self.reply_status(id, result);
            }
            Msg::SetOutputSurface(surface) => {
                let result = self.on_set_output_surface(surface);
                self.reply_status(id, result);
            }
            Msg::Start => self.initialized_on_start(id),
            msg => self.on_common_msg(MsgInfo { msg, id }),
        }
    }

    fn initialized_on_start(&mut self, id: MsgId) {
        if !self.ready_to_start() {
            tracing::error!("callback not set or format is not configured, can't start");
            self.reply_status(id, Err(CodecError::InvalidOperation));
            return;
        }
        match self.send_command(CodecCommand::StateSet(OmxState::Idle)) {
            Ok(()) => {
                self.reply_later(MsgWhat::Start, id);
                self.change_state_to(StateId::Starting);
            }
            Err(_) => self.reply_status(id, Err(CodecError::Unknown)),
        }
    }
}

/// Starting: Loaded -> Idle -> Executing.
impl Codec {
    fn on_starting_entered(&mut self) {
        self.starting_has_error = false;
        self.arm_watchdog();
        let result = self
            .allocate_buffers_on_port(PortIndex::Input)
            .and_then(|()| self.allocate_buffers_on_port(PortIndex::Output));
        if let Err(e) = result {
            tracing::error!("allocate buffers failed: {}", e);
            self.fail_start(e);
        }
    }

    /// Reply the pending start with `error` and fall back to Initialized.
    fn fail_start(&mut self, error: CodecError) {
        self.starting_has_error = true;
        if let Some(id) = self.take_pending_reply(MsgWhat::Start) {
            self.reply_status(id, Err(error));
        }
        self.change_state_to(StateId::Initialized);
    }

    fn roll_back_after_failed_start(&mut self) {
        if let Some(component) = self.component.clone() {
            self.roll_omx_back_to_loaded(component.as_ref());
        }
        self.clear_buffer_pool(PortIndex::Input);
        self.clear_buffer_pool(PortIndex::Output);
    }

    fn starting_on_msg(&mut self, info: MsgInfo<Msg>) {
        let MsgInfo { msg, id } = info;
        match msg {
            msg @ (Msg::SetParameters(_) | Msg::GetInputFormat | Msg::GetOutputFormat) => {
                self.defer(MsgInfo { msg, id });
            }
            Msg::Start | Msg::Flush => self.reply_status(id, Ok(())),
            Msg::CheckIfStuck(generation) => {
                if generation == self.generation {
                    tracing::error!("stucked, omx did not get to executing");
                    self.fail_start(CodecError::Unknown);
                }
            }
            msg => self.on_common_msg(MsgInfo { msg, id }),
        }
    }

    fn starting_on_cmd_complete(&mut self, cmd: CommandKind, data: u32) {
        if cmd != CommandKind::StateSet {
            tracing::warn!("ignore {:?} complete ({}) while starting", cmd, data);
            return;
        }
        match OmxState::from_raw(data) {
            Some(OmxState::Idle) => {
                tracing::info!("omx now idle, begin to set omx to executing");
                if self
                    .send_command(CodecCommand::StateSet(OmxState::Executing))
                    .is_err()
                {
                    self.fail_start(CodecError::Unknown);
                }
            }
            Some(OmxState::Executing) => {
                tracing::info!("omx now executing");
                if let Some(id) = self.take_pending_reply(MsgWhat::Start) {
                    self.reply_status(id, Ok(()));
                }
                if let Err(e) = self.submit_all_buffers_owned_by_us() {
                    tracing::warn!("submit buffers failed: {}", e);
                }
                self.etb_count = 0;
                self.ftb_count = 0;
                self.fbd_count = 0;
                self.change_state_to(StateId::Running);
            }
            other => tracing::warn!("unexpected omx state {:?} while starting", other),
        }
    }
}

/// Running: buffers circulate.
impl Codec {
    fn running_on_msg(&mut self, info: MsgInfo<Msg>) {
        let MsgInfo { msg, id } = info;
        let (input_mode, output_mode) = StateId::Running.modes();
        match msg {
            Msg::Start => {
                let result = self.submit_all_buffers_owned_by_us();
                self.reply_status(id, result);
            }
            Msg::SetParameters(format) => {
                let result = self.on_set_parameters(&format);
                self.reply_status(id, result);
            }
            Msg::RequestIdrFrame => {
                let result = self.request_idr_frame();
                self.reply_status(id, result);
            }
            Msg::Flush => self.running_on_flush(id),
            Msg::GetBufferFromSurface => self.on_get_buffer_from_surface(),
            Msg::GetInputBuffer(buffer_id) => self.reply_get_input_buffer(id, buffer_id),
            Msg::QueueInputBuffer { index, info, flag } => {
                let result = self.on_user_queue_input_buffer(index, info, flag, input_mode);
                self.reply_status(id, result);
            }
            Msg::NotifyEos => {
                let result = self.on_signal_end_of_input_stream();
                self.reply_status(id, result);
            }
            Msg::GetOutputBuffer(buffer_id) => self.reply_get_output_buffer(id, buffer_id),
            Msg::RenderOutputBuffer(buffer_id) => {
                let result = self.on_user_render_output_buffer(buffer_id, output_mode);
                self.reply_status(id, result);
            }
            Msg::ReleaseOutputBuffer(buffer_id) => {
                let result = self.on_user_release_output_buffer(buffer_id, output_mode);
                self.reply_status(id, result);
            }
            msg => self.on_common_msg(MsgInfo { msg, id }),
        }
    }

    fn running_on_flush(&mut self, id: MsgId) {
        self.buffers_circulating = false;
        tracing::info!("begin to ask omx to flush");
        match self.send_command(CodecCommand::Flush(PortIndex::ALL)) {
            Ok(()) => {
                self.reply_later(MsgWhat::Flush, id);
                self.change_state_to(StateId::Flushing);
            }
            Err(_) => self.reply_status(id, Err(CodecError::Unknown)),
        }
    }

    fn running_on_port_settings_changed(&mut self, port: u32, index: u32) {
        if port != PortIndex::Output.raw() {
            tracing::info!("ignore port settings changed on port {}", port);
            return;
        }
        if index != 0 && index != ParamIndex::PortDefinition.raw() {
            tracing::info!("ignore port settings changed, index {:#x}", index);
            return;
        }
        tracing::info!("output format changed");
        if self.update_out_port_format().is_ok() {
            if let (Some(callback), Some(format)) = (&self.callback, &self.output_format) {
                callback.on_output_format_changed(format);
            }
        }
        tracing::info!("begin to ask omx to disable out port");
        match self.send_command(CodecCommand::PortDisable(PortIndex::Output.raw())) {
            Ok(()) => {
                self.erase_out_buffers_owned_by_us_or_surface();
                self.change_state_to(StateId::OutputPortChanged);
            }
            Err(_) => self.signal_error(ErrorType::Internal, CodecError::Unknown),
        }
    }

    fn running_on_shutdown(&mut self, info: MsgInfo<Msg>) {
        let what = info.msg.what();
        self.is_shut_down_from_running = true;
        self.notify_caller = true;
        self.keep_component_allocated = what == MsgWhat::Stop;
        self.buffers_circulating = false;
        tracing::info!(
            "receive {}, etb {}, ftb {}, fbd {}",
            what,
            self.etb_count,
            self.ftb_count,
            self.fbd_count
        );
        self.print_all_buffer_info();
        tracing::info!("begin to set omx to idle");
        match self.send_command(CodecCommand::StateSet(OmxState::Idle)) {
            Ok(()) => {
                self.reply_later(what, info.id);
                self.change_state_to(StateId::Stopping);
            }
            Err(_) => self.reply_status(info.id, Err(CodecError::Unknown)),
        }
    }
}

/// OutputPortChanged: output port disabled, reallocated and re-enabled.
impl Codec {
    fn output_port_changed_on_msg(&mut self, info: MsgInfo<Msg>) {
        let MsgInfo { msg, id } = info;
        let (input_mode, output_mode) = StateId::OutputPortChanged.modes();
        match msg {
            Msg::Flush => {
                if self.has_fatal_error {
                    self.arm_force_shutdown();
                }
                self.defer(MsgInfo { msg, id });
            }
            msg @ (Msg::Start
            | Msg::SetParameters(_)
            | Msg::GetInputFormat
            | Msg::GetOutputFormat
            | Msg::GetOutputBuffer(_)) => self.defer(MsgInfo { msg, id }),
            Msg::GetInputBuffer(buffer_id) => self.reply_get_input_buffer(id, buffer_id),
            Msg::QueueInputBuffer { index, info, flag } => {
                let result = self.on_user_queue_input_buffer(index, info, flag, input_mode);
                self.reply_status(id, result);
            }
            Msg::NotifyEos => {
                let result = self.on_signal_end_of_input_stream();
                self.reply_status(id, result);
            }
            Msg::RenderOutputBuffer(buffer_id) => {
                let result = self.on_user_render_output_buffer(buffer_id, output_mode);
                self.reply_status(id, result);
            }
            Msg::ReleaseOutputBuffer(buffer_id) => {
                let result = self.on_user_release_output_buffer(buffer_id, output_mode);
                self.reply_status(id, result);
            }
            Msg::ForceShutdown(generation) => self.force_shutdown(generation),
            Msg::CheckIfStuck(generation) => {
                if generation == self.generation {
                    tracing::error!("stucked");
                    self.print_all_buffer_info();
                    self.signal_error(ErrorType::Internal, CodecError::Unknown);
                }
            }
            msg => self.on_common_msg(MsgInfo { msg, id }),
        }
    }

    fn output_port_changed_on_cmd_complete(&mut self, cmd: CommandKind, data: u32) {
        if data != PortIndex::Output.raw() {
            tracing::warn!("ignore {:?} complete on port {}", cmd, data);
            return;
        }
        match cmd {
            CommandKind::PortDisable => {
                tracing::info!("output port is disabled");
                self.handle_output_port_disabled();
            }
            CommandKind::PortEnable => {
                tracing::info!("output port is enabled");
                if self.buffers_circulating {
                    if let Err(e) = self.submit_output_buffers() {
                        tracing::warn!("resubmit output buffers failed: {}", e);
                    }
                }
                self.change_state_to(StateId::Running);
            }
            other => tracing::warn!("ignore {:?} complete during port change", other),
        }
    }

    fn handle_output_port_disabled(&mut self) {
        let remaining = self.pool(PortIndex::Output).len();
        let result = if remaining != 0 {
            tracing::error!("output port is disabled but not empty: {}", remaining);
            Err(CodecError::Unknown)
        } else {
            tracing::info!("begin to ask omx to enable out port");
            self.send_command(CodecCommand::PortEnable(PortIndex::Output.raw()))
                .and_then(|()| self.allocate_buffers_on_port(PortIndex::Output))
        };
        if result.is_err() {
            self.signal_error(ErrorType::Internal, CodecError::InvalidVal);
        }
    }
}

/// Flushing: both ports flushed, every buffer back with us.
impl Codec {
    fn on_flushing_entered(&mut self) {
        self.flush_complete = [false; 2];
        if self.is_surface_input() {
            encoder::discard_waiting_surface_frames(self);
        }
        self.reclaim_buffers(PortIndex::Input, BufferOwner::User);
        self.reclaim_buffers(PortIndex::Output, BufferOwner::User);
        tracing::info!("all buffers owned by user are now owned by us");
        self.arm_watchdog();
    }

    fn flushing_on_msg(&mut self, info: MsgInfo<Msg>) {
        let MsgInfo { msg, id } = info;
        match msg {
            Msg::Flush => self.reply_status(id, Ok(())),
            Msg::ForceShutdown(generation) => self.force_shutdown(generation),
            Msg::CheckIfStuck(generation) => {
                if generation == self.generation {
                    tracing::error!("stucked");
                    self.signal_error(ErrorType::Internal, CodecError::Unknown);
                }
            }
            msg => self.on_common_msg(MsgInfo { msg, id }),
        }
    }

    fn flushing_on_cmd_complete(&mut self, cmd: CommandKind, data: u32) {
        if cmd != CommandKind::Flush {
            tracing::warn!("ignore {:?} complete while flushing", cmd);
            return;
        }
        if self.update_flush_status(data).is_err() || self.flush_complete != [true; 2] {
            return;
        }
        if !self.is_all_buffers_owned_by_us_or_surface() {
            return;
        }
        if let Some(id) = self.take_pending_reply(MsgWhat::Flush) {
            self.reply_status(id, Ok(()));
        }
        self.input_eos = false;
        self.output_eos = false;
        self.change_state_to(StateId::Running);
    }

    fn update_flush_status(&mut self, data: u32) -> crate::CodecResult {
        if let Some(port) = PortIndex::from_raw(data) {
            let done = &mut self.flush_complete[port.raw() as usize];
            if *done {
                tracing::error!("flush already completed for {} port", port);
            }
            *done = true;
        } else if data == PortIndex::ALL {
            if self.flush_complete != [true; 2] {
                tracing::warn!(
                    "flush complete for all ports, status {:?}",
                    self.flush_complete
                );
                return Err(CodecError::InvalidVal);
            }
        } else {
            tracing::warn!("unexpected port {} in flush complete", data);
        }
        Ok(())
    }
}

/// Stopping: Executing -> Idle -> Loaded, buffers freed on the way.
impl Codec {
    fn on_stopping_entered(&mut self) {
        self.stopping_idle = false;
        self.changing_to_loaded = false;
        if self.is_surface_input() {
            encoder::discard_waiting_surface_frames(self);
        }
        self.reclaim_buffers(PortIndex::Input, BufferOwner::User);
        self.reclaim_buffers(PortIndex::Output, BufferOwner::User);
        tracing::info!("all buffers owned by user are now owned by us");
        self.arm_watchdog();
    }

    fn stopping_on_msg(&mut self, info: MsgInfo<Msg>) {
        let MsgInfo { msg, id } = info;
        match msg {
            Msg::CheckIfStuck(generation) => {
                if generation == self.generation {
                    tracing::error!("stucked, force state transition");
                    self.reclaim_buffers(PortIndex::Input, BufferOwner::Hardware);
                    self.reclaim_buffers(PortIndex::Output, BufferOwner::Hardware);
                    self.change_to_loaded(true);
                    self.change_state_to(StateId::Initialized);
                }
            }
            msg => self.on_common_msg(MsgInfo { msg, id }),
        }
    }

    fn stopping_on_cmd_complete(&mut self, cmd: CommandKind, data: u32) {
        if cmd != CommandKind::StateSet {
            tracing::warn!("ignore {:?} complete ({}) while stopping", cmd, data);
            return;
        }
        match OmxState::from_raw(data) {
            Some(OmxState::Idle) => {
                tracing::info!("omx now idle");
                self.stopping_idle = true;
                if self.is_all_buffers_owned_by_us_or_surface() {
                    self.change_to_loaded(false);
                } else {
                    tracing::debug!("cannot change state yet");
                }
            }
            Some(OmxState::Loaded) => {
                tracing::info!("omx now loaded");
                self.change_state_to(StateId::Initialized);
            }
            other => tracing::warn!("unexpected omx state {:?} while stopping", other),
        }
    }

    /// Ask for Loaded and drop both pools without waiting for the reply.
    fn change_to_loaded(&mut self, force_free: bool) {
        if !self.changing_to_loaded {
            tracing::info!("begin to set omx to loaded");
            if self
                .send_command(CodecCommand::StateSet(OmxState::Loaded))
                .is_ok()
            {
                self.changing_to_loaded = true;
            }
        }
        if force_free || self.changing_to_loaded {
            self.clear_buffer_pool(PortIndex::Input);
            self.clear_buffer_pool(PortIndex::Output);
            return;
        }
        self.signal_error(ErrorType::Internal, CodecError::Unknown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_table() {
        use BufferOperationMode::{Free, Keep, Resubmit};
        assert_eq!(StateId::Running.modes(), (Resubmit, Resubmit));
        assert_eq!(StateId::OutputPortChanged.modes(), (Resubmit, Free));
        for state in [
            StateId::Uninitialized,
            StateId::Initialized,
            StateId::Starting,
            StateId::Flushing,
            StateId::Stopping,
        ] {
            assert_eq!(state.modes(), (Keep, Keep), "{}", state);
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(StateId::OutputPortChanged.to_string(), "OutputPortChanged");
    }
}
