//! Buffer pools and the ownership protocol.
//!
//! Every slot of the input and output pools has exactly one owner. A slot
//! only moves along these edges:
//!
//! ```text
//! Us -> User       notify the user (input to fill, output available)
//! User -> Us       user queues input / releases or renders output
//! Us -> Hardware   empty/fill this buffer
//! Hardware -> Us   empty/fill buffer done
//! Us -> Surface    render (decoder output)
//! Surface -> Us    surface hands the buffer back
//! ```
//!
//! What happens after the hardware returns a buffer depends on the current
//! state's [`BufferOperationMode`].

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;

use hcodec_hdi::{
    ComponentExt, OmxCodecBuffer, PortDefinition, PortIndex, SharedMemory, SurfaceBuffer,
    BUFFER_FLAG_CODECCONFIG, BUFFER_FLAG_EOS, BUFFER_FLAG_SYNCFRAME,
};

use super::codec::{Codec, Direction};
use super::{decoder, encoder};
use crate::{BufferFlag, CodecBufferInfo, CodecError, CodecResult};

/// Upper bound on the size of a single shared-memory buffer.
pub(crate) const MAX_HCODEC_BUFFER_SIZE: u32 = 8192 * 4096 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BufferOwner {
    Us,
    User,
    Hardware,
    /// Queued in the decoder's display surface.
    Surface,
}

impl fmt::Display for BufferOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Us => "us",
            Self::User => "user",
            Self::Hardware => "hardware",
            Self::Surface => "surface",
        })
    }
}

/// What to do with a buffer once the hardware (or the user) hands it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BufferOperationMode {
    /// Leave it with us.
    Keep,
    /// Pass it on to the next owner in the cycle.
    Resubmit,
    /// Drop it from the pool and free it in the driver.
    Free,
}

/// One pool slot.
pub(crate) struct BufferInfo {
    pub(crate) owner: BufferOwner,
    /// Driver descriptor; `buffer_id` is fixed for the slot's lifetime.
    pub(crate) omx: OmxCodecBuffer,
    pub(crate) surface_buffer: Option<Arc<SurfaceBuffer>>,
    pub(crate) memory: Option<SharedMemory>,
    pub(crate) is_image: bool,
}

impl BufferInfo {
    pub(crate) fn id(&self) -> u32 {
        self.omx.buffer_id
    }
}

pub(crate) fn user_flag_to_omx(flag: BufferFlag) -> u32 {
    let mut omx = 0;
    if flag.contains(BufferFlag::CODEC_DATA) {
        omx |= BUFFER_FLAG_CODECCONFIG;
    }
    if flag.contains(BufferFlag::EOS) {
        omx |= BUFFER_FLAG_EOS;
    }
    omx
}

pub(crate) fn omx_flag_to_user(omx: u32) -> BufferFlag {
    let mut flag = BufferFlag::NONE;
    if omx & BUFFER_FLAG_SYNCFRAME != 0 {
        flag |= BufferFlag::SYNC_FRAME;
    }
    if omx & BUFFER_FLAG_CODECCONFIG != 0 {
        flag |= BufferFlag::CODEC_DATA;
    }
    if omx & BUFFER_FLAG_EOS != 0 {
        flag |= BufferFlag::EOS;
    }
    flag
}

fn slot(port: PortIndex) -> usize {
    port.raw() as usize
}

impl Codec {
    pub(crate) fn pool(&self, port: PortIndex) -> &[BufferInfo] {
        &self.pools[slot(port)]
    }

    pub(crate) fn pool_mut(&mut self, port: PortIndex) -> &mut Vec<BufferInfo> {
        &mut self.pools[slot(port)]
    }

    pub(crate) fn find_buffer_index(&self, port: PortIndex, id: u32) -> Option<usize> {
        self.pool(port).iter().position(|b| b.id() == id)
    }

    /// Index of buffer `id` on `port`, which must currently belong to the user.
    pub(crate) fn user_buffer_index(&self, port: PortIndex, id: u32) -> CodecResult<usize> {
        let Some(idx) = self.find_buffer_index(port, id) else {
            tracing::error!("unknown {} buffer id {}", port, id);
            return Err(CodecError::InvalidVal);
        };
        let owner = self.pool(port)[idx].owner;
        if owner != BufferOwner::User {
            tracing::error!("wrong ownership: {} buffer {} is owned by {}", port, id, owner);
            return Err(CodecError::InvalidState);
        }
        Ok(idx)
    }

    /// Index of a buffer coming back from the hardware, now owned by us.
    pub(crate) fn take_back_from_hardware(&mut self, port: PortIndex, id: u32) -> Option<usize> {
        let Some(idx) = self.find_buffer_index(port, id) else {
            tracing::error!("unknown {} buffer id {}", port, id);
            return None;
        };
        let info = &mut self.pool_mut(port)[idx];
        if info.owner != BufferOwner::Hardware {
            tracing::error!("wrong ownership: {} buffer {} is owned by {}", port, id, info.owner);
            return None;
        }
        info.owner = BufferOwner::Us;
        Some(idx)
    }

    pub(crate) fn notify_user_fill_input(&mut self, idx: usize) {
        let Some(callback) = self.callback.clone() else {
            tracing::error!("no callback to hand input buffers to");
            return;
        };
        let info = &mut self.pool_mut(PortIndex::Input)[idx];
        info.owner = BufferOwner::User;
        let id = info.id();
        tracing::debug!("inBufId = {}", id);
        callback.on_input_buffer_available(id);
    }

    fn notify_user_output_available(&mut self, idx: usize) {
        let Some(callback) = self.callback.clone() else {
            tracing::error!("no callback to hand output buffers to");
            return;
        };
        let info = &mut self.pool_mut(PortIndex::Output)[idx];
        info.owner = BufferOwner::User;
        let id = info.id();
        let buffer_info = CodecBufferInfo {
            presentation_time_us: info.omx.pts,
            size: i32::try_from(info.omx.filled_len).unwrap_or(i32::MAX),
            offset: i32::try_from(info.omx.offset).unwrap_or(i32::MAX),
        };
        let flag = omx_flag_to_user(info.omx.flag);
        tracing::debug!(
            "outBufId = {}, pts = {}, size = {}, flag = {}",
            id,
            buffer_info.presentation_time_us,
            buffer_info.size,
            flag
        );
        callback.on_output_buffer_available(id, buffer_info, flag);
    }

    /// Hand input slot `idx` to the hardware.
    pub(crate) fn notify_omx_empty(&mut self, idx: usize) -> CodecResult {
        let component = self.component()?;
        let (id, flag, filled) = {
            let omx = &self.pool(PortIndex::Input)[idx].omx;
            (omx.buffer_id, omx.flag, omx.filled_len)
        };
        if flag & BUFFER_FLAG_CODECCONFIG != 0 {
            tracing::info!("queue codec specific data, size {}", filled);
        } else if flag & BUFFER_FLAG_EOS != 0 {
            tracing::info!("input eos");
            self.input_eos = true;
        }
        self.dump_buffer(PortIndex::Input, idx);
        let info = &mut self.pool_mut(PortIndex::Input)[idx];
        if let Err(e) = component.empty_this_buffer(&info.omx) {
            tracing::error!("empty buffer {} failed: {}", id, e);
            return Err(CodecError::Unknown);
        }
        info.owner = BufferOwner::Hardware;
        self.etb_count += 1;
        Ok(())
    }

    /// Hand output slot `idx` to the hardware.
    pub(crate) fn notify_omx_fill(&mut self, idx: usize) -> CodecResult {
        let component = self.component()?;
        let info = &mut self.pool_mut(PortIndex::Output)[idx];
        info.omx.filled_len = 0;
        info.omx.offset = 0;
        info.omx.flag = 0;
        if let Err(e) = component.fill_this_buffer(&info.omx) {
            tracing::error!("fill buffer {} failed: {}", info.id(), e);
            return Err(CodecError::Unknown);
        }
        info.owner = BufferOwner::Hardware;
        self.ftb_count += 1;
        Ok(())
    }

    pub(crate) fn on_user_get_input_buffer(&self, id: u32) -> CodecResult<SharedMemory> {
        if self.is_surface_input() {
            tracing::error!("input buffers come from the input surface");
            return Err(CodecError::InvalidOperation);
        }
        let idx = self.user_buffer_index(PortIndex::Input, id)?;
        self.pool(PortIndex::Input)[idx].memory.clone().ok_or_else(|| {
            tracing::error!("input buffer {} has no shared memory", id);
            CodecError::InvalidOperation
        })
    }

    pub(crate) fn on_user_queue_input_buffer(
        &mut self,
        id: u32,
        info: CodecBufferInfo,
        flag: BufferFlag,
        mode: BufferOperationMode,
    ) -> CodecResult {
        if self.is_surface_input() {
            tracing::error!("input buffers come from the input surface");
            return Err(CodecError::InvalidOperation);
        }
        let idx = self.user_buffer_index(PortIndex::Input, id)?;
        let (Ok(size), Ok(offset)) = (u32::try_from(info.size), u32::try_from(info.offset)) else {
            tracing::error!("invalid size {} or offset {}", info.size, info.offset);
            return Err(CodecError::InvalidVal);
        };
        let alloc_len = self.pool(PortIndex::Input)[idx].omx.alloc_len;
        if u64::from(size) + u64::from(offset) > u64::from(alloc_len) {
            tracing::error!("payload {}+{} exceeds buffer size {}", offset, size, alloc_len);
            return Err(CodecError::InvalidVal);
        }
        self.pool_mut(PortIndex::Input)[idx].owner = BufferOwner::Us;
        match mode {
            BufferOperationMode::Keep => Ok(()),
            BufferOperationMode::Resubmit => {
                if self.input_eos {
                    tracing::debug!("input eos already reached, keep buffer {}", id);
                    return Ok(());
                }
                if !flag.contains(BufferFlag::EOS) && size == 0 {
                    tracing::debug!("empty input buffer {}, hand it back", id);
                    self.notify_user_fill_input(idx);
                    return Ok(());
                }
                let omx = &mut self.pool_mut(PortIndex::Input)[idx].omx;
                omx.filled_len = size;
                omx.offset = offset;
                omx.pts = info.presentation_time_us;
                omx.flag = user_flag_to_omx(flag);
                self.notify_omx_empty(idx)
            }
            BufferOperationMode::Free => {
                tracing::error!("input buffers are never freed while queued");
                Err(CodecError::Unknown)
            }
        }
    }

    pub(crate) fn on_fill_buffer_done(&mut self, buffer: &OmxCodecBuffer, mode: BufferOperationMode) {
        let Some(idx) = self.take_back_from_hardware(PortIndex::Output, buffer.buffer_id) else {
            return;
        };
        if !buffer.is_eos() && buffer.filled_len != 0 {
            self.fbd_count += 1;
        }
        {
            let omx = &mut self.pool_mut(PortIndex::Output)[idx].omx;
            omx.offset = buffer.offset;
            omx.filled_len = buffer.filled_len;
            omx.pts = buffer.pts;
            omx.flag = buffer.flag;
        }
        self.dump_buffer(PortIndex::Output, idx);
        match mode {
            BufferOperationMode::Keep => {}
            BufferOperationMode::Resubmit => {
                if self.output_eos {
                    tracing::debug!("output eos already reached, keep buffer {}", buffer.buffer_id);
                } else if !buffer.is_eos() && buffer.filled_len == 0 {
                    tracing::debug!("empty output buffer {}, resubmit", buffer.buffer_id);
                    if let Err(e) = self.notify_omx_fill(idx) {
                        tracing::warn!("resubmit output buffer failed: {}", e);
                    }
                } else {
                    self.notify_user_output_available(idx);
                    if buffer.is_eos() {
                        tracing::info!("output eos");
                        self.output_eos = true;
                    }
                }
            }
            BufferOperationMode::Free => self.erase_buffer_from_pool(PortIndex::Output, idx),
        }
    }

    /// Input buffer `id` came back from the hardware (shared-memory input).
    pub(crate) fn on_empty_buffer_done(&mut self, id: u32, mode: BufferOperationMode) {
        let Some(idx) = self.take_back_from_hardware(PortIndex::Input, id) else {
            return;
        };
        tracing::debug!("inBufId = {}", id);
        match mode {
            BufferOperationMode::Keep => {}
            BufferOperationMode::Resubmit => {
                if !self.input_eos {
                    self.notify_user_fill_input(idx);
                }
            }
            BufferOperationMode::Free => {
                tracing::error!("input buffer {} returned in free mode", id);
            }
        }
    }

    pub(crate) fn on_user_get_output_buffer(&self, id: u32) -> CodecResult<SharedMemory> {
        if self.is_surface_output() {
            tracing::error!("output buffers are rendered to the surface");
            return Err(CodecError::InvalidOperation);
        }
        let idx = self.user_buffer_index(PortIndex::Output, id)?;
        self.pool(PortIndex::Output)[idx].memory.clone().ok_or_else(|| {
            tracing::error!("output buffer {} has no shared memory", id);
            CodecError::InvalidOperation
        })
    }

    pub(crate) fn on_user_release_output_buffer(
        &mut self,
        id: u32,
        mode: BufferOperationMode,
    ) -> CodecResult {
        let idx = self.user_buffer_index(PortIndex::Output, id)?;
        self.pool_mut(PortIndex::Output)[idx].owner = BufferOwner::Us;
        match mode {
            BufferOperationMode::Keep => Ok(()),
            BufferOperationMode::Resubmit => {
                if self.output_eos {
                    return Ok(());
                }
                self.notify_omx_fill(idx)
            }
            BufferOperationMode::Free => {
                self.erase_buffer_from_pool(PortIndex::Output, idx);
                Ok(())
            }
        }
    }

    /// Take every buffer of `from` on `port` back.
    pub(crate) fn reclaim_buffers(&mut self, port: PortIndex, from: BufferOwner) {
        let mut count = 0;
        for info in self.pool_mut(port) {
            if info.owner == from {
                info.owner = BufferOwner::Us;
                count += 1;
            }
        }
        tracing::debug!("reclaimed {} {} buffers from {}", count, port, from);
    }

    pub(crate) fn is_all_buffers_owned_by_us_or_surface(&self) -> bool {
        [PortIndex::Input, PortIndex::Output].into_iter().all(|port| {
            self.pool(port).iter().all(|info| {
                let ok = matches!(info.owner, BufferOwner::Us | BufferOwner::Surface);
                if !ok {
                    tracing::debug!("{} buffer {} is owned by {}", port, info.id(), info.owner);
                }
                ok
            })
        })
    }

    pub(crate) fn clear_buffer_pool(&mut self, port: PortIndex) {
        for idx in (0..self.pool(port).len()).rev() {
            self.erase_buffer_from_pool(port, idx);
        }
    }

    pub(crate) fn erase_out_buffers_owned_by_us_or_surface(&mut self) {
        for idx in (0..self.pool(PortIndex::Output).len()).rev() {
            let owner = self.pool(PortIndex::Output)[idx].owner;
            if matches!(owner, BufferOwner::Us | BufferOwner::Surface) {
                self.erase_buffer_from_pool(PortIndex::Output, idx);
            }
        }
    }

    /// Remove slot `idx` and free it in the driver.
    pub(crate) fn erase_buffer_from_pool(&mut self, port: PortIndex, idx: usize) {
        if idx >= self.pool(port).len() {
            return;
        }
        if port == PortIndex::Output && self.direction == Direction::Decoder {
            decoder::cancel_buffer_to_surface(self, idx);
        }
        if port == PortIndex::Input && self.is_surface_input() {
            encoder::release_slot_frame(self, idx);
        }
        let info = self.pool_mut(port).remove(idx);
        if let Some(component) = &self.component {
            if let Err(e) = component.free_buffer(port, &info.omx) {
                tracing::warn!("free {} buffer {} failed: {}", port, info.id(), e);
            }
        }
    }

    /// Replace the pool of `port` with fresh shared-memory buffers sized by
    /// the port definition.
    pub(crate) fn allocate_shared_buffers(&mut self, port: PortIndex, is_image: bool) -> CodecResult {
        let component = self.component()?;
        let query = PortDefinition {
            port,
            ..Default::default()
        };
        let def = component.get_param(query).map_err(|e| {
            tracing::error!("get {} port definition failed: {}", port, e);
            CodecError::InvalidVal
        })?;
        if def.buffer_size == 0 || def.buffer_size > MAX_HCODEC_BUFFER_SIZE {
            tracing::error!("invalid {} buffer size {}", port, def.buffer_size);
            return Err(CodecError::InvalidVal);
        }
        self.clear_buffer_pool(port);
        for i in 0..def.buffer_count_actual {
            let name = format!("{}_{}_{}", self.component_name, port, i);
            let memory = SharedMemory::create(def.buffer_size as usize, name).map_err(|e| {
                tracing::error!("create shared memory failed: {}", e);
                CodecError::NoMemory
            })?;
            let desc = OmxCodecBuffer::from_shared_memory(
                memory.clone(),
                def.buffer_size,
                port == PortIndex::Input,
            );
            let omx = component.use_buffer(port, desc).map_err(|e| {
                tracing::error!("use {} buffer failed: {}", port, e);
                CodecError::InvalidVal
            })?;
            self.pool_mut(port).push(BufferInfo {
                owner: BufferOwner::Us,
                omx,
                surface_buffer: None,
                memory: Some(memory),
                is_image,
            });
        }
        tracing::info!(
            "allocated {} {} buffers of {} bytes",
            def.buffer_count_actual,
            port,
            def.buffer_size
        );
        Ok(())
    }

    pub(crate) fn print_all_buffer_info(&self) {
        for port in [PortIndex::Input, PortIndex::Output] {
            let owners: Vec<String> = self
                .pool(port)
                .iter()
                .map(|info| format!("{}:{}", info.id(), info.owner))
                .collect();
            let kind = match self.pool(port).first() {
                Some(info) if info.is_image => "image",
                Some(_) => "stream",
                None => "empty",
            };
            tracing::info!("{} buffers ({}): [{}]", port, kind, owners.join(", "));
        }
    }

    /// Append the payload of a shared-memory slot to the dump file of `port`.
    pub(crate) fn dump_buffer(&self, port: PortIndex, idx: usize) {
        let Some(dir) = &self.options.dump_dir else {
            return;
        };
        let info = &self.pool(port)[idx];
        let Some(memory) = &info.memory else {
            return;
        };
        if info.omx.filled_len == 0 {
            return;
        }
        let data = memory.read_at(info.omx.offset as usize, info.omx.filled_len as usize);
        let path = dir.join(format!("{}_{}.bin", self.component_name, port));
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(&data));
        if let Err(e) = written {
            tracing::warn!("dump to {} failed: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_flag_to_omx() {
        assert_eq!(user_flag_to_omx(BufferFlag::NONE), 0);
        assert_eq!(
            user_flag_to_omx(BufferFlag::EOS | BufferFlag::CODEC_DATA),
            BUFFER_FLAG_EOS | BUFFER_FLAG_CODECCONFIG
        );
        assert_eq!(user_flag_to_omx(BufferFlag::SYNC_FRAME), 0);
    }

    #[test]
    fn test_omx_flag_to_user() {
        assert_eq!(
            omx_flag_to_user(BUFFER_FLAG_SYNCFRAME | BUFFER_FLAG_EOS),
            BufferFlag::SYNC_FRAME | BufferFlag::EOS
        );
        assert_eq!(omx_flag_to_user(BUFFER_FLAG_CODECCONFIG), BufferFlag::CODEC_DATA);
    }

    #[test]
    fn test_owner_display() {
        assert_eq!(BufferOwner::Hardware.to_string(), "hardware");
        assert_eq!(BufferOwner::Surface.to_string(), "surface");
    }
}
