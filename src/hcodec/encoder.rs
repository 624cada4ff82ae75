//! Encoder policy: ashmem or surface input, ashmem bitstream output.
//!
//! With an input surface the input pool holds dynamic-handle slots. Each
//! frame acquired from the surface is wrapped into a free slot, sent to the
//! hardware and released back to the producer once the hardware is done.
//! Frames signalled while every slot is busy are counted and picked up as
//! soon as a slot comes back.

use std::sync::Arc;
use std::time::Duration;

use hcodec_hdi::{
    AvcLoopFilter, AvcParams, AvcProfileType, CodecBufferType, ColorAspectsParam, ColorRange,
    ComponentExt, ConstantQuality, ControlRate, GraphicPixelFormat, HevcParams, IntraRefreshVop,
    OmxCodecBuffer, PortDefinition, PortIndex, Surface, UseBufferType, VideoBitrate,
    BUFFER_FLAG_EOS, PICTURE_TYPE_B, PICTURE_TYPE_I, PICTURE_TYPE_P,
};

use super::buffer::{BufferInfo, BufferOperationMode, BufferOwner};
use super::codec::{Codec, PortInfo, SharedBufferFormat};
use super::decoder::{frame_rate, required_geometry};
use super::msg::Msg;
use crate::convert::{
    avc_profile_to_hdi, hevc_profile_to_hdi, pixel_to_graphic, raw_matrix_to_hdi,
    raw_primary_to_hdi, raw_transfer_to_hdi,
};
use crate::format::keys;
use crate::types::{
    AvcProfile, BitrateMode, ColorPrimary, HevcProfile, MatrixCoefficient, TransferCharacteristic,
};
use crate::{CodecError, CodecResult, Format, PixelFormat};

/// P frames between two I frames for a GOP of `i_frame_interval_ms`.
///
/// A negative interval means a single I frame followed by P frames only,
/// zero means every frame is an I frame.
pub(crate) fn p_frames_spacing(i_frame_interval_ms: i32, frame_rate: f64, b_frames: u32) -> u32 {
    if i_frame_interval_ms < 0 {
        return u32::MAX - 1;
    }
    if i_frame_interval_ms == 0 {
        return 0;
    }
    let i_frames_interval = (f64::from(i_frame_interval_ms) * frame_rate / 1000.0) as u32;
    let p_frames = i_frames_interval / (b_frames + 1);
    p_frames.saturating_sub(1)
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Input buffer size for shared-memory input, in 128x128 blocks.
pub(crate) fn input_buffer_size(width: u32, height: u32, pixel_fmt: PixelFormat) -> u32 {
    let pixels = align_to(width, 128).saturating_mul(align_to(height, 128));
    match pixel_fmt {
        PixelFormat::Rgba => pixels.saturating_mul(4),
        _ => pixels.saturating_mul(3) / 2,
    }
}

pub(crate) fn on_configure(codec: &mut Codec, format: &Format) -> CodecResult {
    codec.config_format = Some(format.clone());
    setup_port(codec, format)?;
    let protocol = match codec.coding_type {
        hcodec_hdi::CodingType::Avc => setup_avc(codec, format),
        hcodec_hdi::CodingType::Hevc => setup_hevc(codec, format),
        hcodec_hdi::CodingType::Unused => Ok(()),
    };
    if let Err(e) = protocol {
        tracing::warn!("set protocol param failed: {}", e);
    }
    if let Err(e) = configure_output_bitrate(codec, format) {
        tracing::warn!("configure output bitrate failed: {}", e);
    }
    if let Err(e) = set_color_aspects(codec, format) {
        tracing::warn!("set color aspects failed: {}", e);
    }
    Ok(())
}

fn setup_port(codec: &mut Codec, format: &Format) -> CodecResult {
    let (width, height, pixel_fmt) = required_geometry(format)?;
    let display_fmt = pixel_to_graphic(pixel_fmt);
    tracing::info!(
        "user set width {}, height {}, pixel format {:?}, display format {:?}",
        width,
        height,
        pixel_fmt,
        display_fmt
    );
    let frame_rate = frame_rate(format);

    let input = PortInfo {
        width,
        height,
        input_buf_size: Some(input_buffer_size(width, height, pixel_fmt)),
        coding: hcodec_hdi::CodingType::Unused,
        pixel_fmt: display_fmt,
        frame_rate,
    };
    codec.set_video_port_info(PortIndex::Input, &input)?;

    let output = PortInfo {
        width,
        height,
        input_buf_size: None,
        coding: codec.coding_type,
        pixel_fmt: GraphicPixelFormat::Butt,
        frame_rate,
    };
    codec.set_video_port_info(PortIndex::Output, &output)?;

    let stride = codec
        .input_format
        .as_ref()
        .and_then(|f| f.get_int(keys::STRIDE))
        .unwrap_or_else(|| i32::try_from(width).unwrap_or(i32::MAX));
    codec.shared_buffer_format = Some(SharedBufferFormat {
        width,
        height,
        stride,
    });
    if let Some(input_format) = &mut codec.input_format {
        input_format.set_int(keys::PIXEL_FORMAT, pixel_fmt.raw());
    }
    Ok(())
}

pub(crate) fn update_in_port_format(codec: &mut Codec) -> CodecResult {
    let def = codec.get_port_definition(PortIndex::Input)?;
    let format = codec.input_format.get_or_insert_with(Format::new);
    format.set_int(keys::WIDTH, i32::try_from(def.video.frame_width).unwrap_or(i32::MAX));
    format.set_int(keys::HEIGHT, i32::try_from(def.video.frame_height).unwrap_or(i32::MAX));
    format.set_int(keys::STRIDE, def.video.stride);
    if let Some(shared) = &mut codec.shared_buffer_format {
        shared.stride = def.video.stride;
    }
    Ok(())
}

pub(crate) fn update_out_port_format(codec: &mut Codec) -> CodecResult {
    let def = codec.get_port_definition(PortIndex::Output)?;
    let format = codec.output_format.get_or_insert_with(Format::new);
    format.set_int(keys::WIDTH, i32::try_from(def.video.frame_width).unwrap_or(i32::MAX));
    format.set_int(keys::HEIGHT, i32::try_from(def.video.frame_height).unwrap_or(i32::MAX));
    Ok(())
}

fn configure_output_bitrate(codec: &Codec, format: &Format) -> CodecResult {
    let Some(mode) = format
        .get_int(keys::VIDEO_ENCODE_BITRATE_MODE)
        .and_then(BitrateMode::from_raw)
    else {
        return Err(CodecError::InvalidVal);
    };
    let component = codec.component()?;
    match mode {
        BitrateMode::Cbr | BitrateMode::Vbr => {
            let bitrate = format
                .get_long(keys::BITRATE)
                .filter(|b| *b > 0)
                .and_then(|b| u32::try_from(b).ok());
            let Some(bitrate) = bitrate else {
                tracing::warn!("user set CBR/VBR mode but not set valid bitrate");
                return Err(CodecError::InvalidVal);
            };
            let param = VideoBitrate {
                port: PortIndex::Output,
                control_rate: if mode == BitrateMode::Cbr {
                    ControlRate::Constant
                } else {
                    ControlRate::Variable
                },
                target_bitrate: bitrate,
            };
            component.set_param(&param).map_err(|e| {
                tracing::error!("failed to set bitrate: {}", e);
                CodecError::Unknown
            })?;
            tracing::info!("set {:?} mode and target bitrate {} bps succ", mode, bitrate);
        }
        BitrateMode::Cq => {
            let Some(quality) = format
                .get_int(keys::QUALITY)
                .and_then(|q| u32::try_from(q).ok())
            else {
                tracing::warn!("user set CQ mode but not set valid quality");
                return Err(CodecError::InvalidVal);
            };
            let param = ConstantQuality {
                port: PortIndex::Output,
                quality,
            };
            component.set_param(&param).map_err(|e| {
                tracing::error!("failed to set constant quality: {}", e);
                CodecError::Unknown
            })?;
            tracing::info!("set CQ mode and target quality {} succ", quality);
        }
    }
    Ok(())
}

/// Fill the GOP related fields of `avc` from the user format.
pub(crate) fn set_avc_fields(avc: &mut AvcParams, format: &Format) {
    let i_frame_interval = format.get_int(keys::I_FRAME_INTERVAL).unwrap_or(-1);
    let frame_rate = format.get_double(keys::FRAME_RATE).unwrap_or(30.0);
    if let Some(profile) = format
        .get_int(keys::PROFILE)
        .and_then(AvcProfile::from_raw)
        .and_then(avc_profile_to_hdi)
    {
        avc.profile = profile;
    }
    tracing::info!(
        "i frame interval {}, frame rate {:.2}, profile {:?}, level {}",
        i_frame_interval,
        frame_rate,
        avc.profile,
        avc.level
    );

    match avc.profile {
        AvcProfileType::Baseline => {
            avc.slice_header_spacing = 0;
            avc.use_hadamard = true;
            avc.ref_frames = 1;
            avc.p_frames = p_frames_spacing(i_frame_interval, frame_rate, avc.b_frames);
            if avc.p_frames == 0 {
                avc.allowed_picture_types = PICTURE_TYPE_I;
            }
            avc.ref_idx10_active_minus1 = 0;
            avc.ref_idx11_active_minus1 = 0;
            avc.entropy_coding_cabac = false;
            avc.weighted_p_prediction = false;
            avc.const_ipred = false;
            avc.direct_8x8_inference = false;
            avc.direct_spatial_temporal = false;
            avc.cabac_init_idc = 0;
        }
        AvcProfileType::Main | AvcProfileType::High => {
            avc.slice_header_spacing = 0;
            avc.use_hadamard = true;
            if let Some(b_frames) = format
                .get_int(keys::MAX_B_FRAMES)
                .and_then(|b| u32::try_from(b).ok())
            {
                avc.b_frames = b_frames;
            }
            avc.ref_frames = if avc.b_frames == 0 { 1 } else { 2 };
            avc.p_frames = p_frames_spacing(i_frame_interval, frame_rate, avc.b_frames);
            avc.allowed_picture_types = PICTURE_TYPE_I | PICTURE_TYPE_P;
            avc.ref_idx10_active_minus1 = 0;
            avc.ref_idx11_active_minus1 = 0;
            avc.entropy_coding_cabac = true;
            avc.weighted_p_prediction = true;
            avc.const_ipred = true;
            avc.direct_8x8_inference = true;
            avc.direct_spatial_temporal = true;
            avc.cabac_init_idc = 1;
        }
        _ => {}
    }
}

fn setup_avc(codec: &Codec, format: &Format) -> CodecResult {
    let component = codec.component()?;
    let query = AvcParams {
        port: PortIndex::Output,
        ..Default::default()
    };
    let mut avc = component.get_param(query).map_err(|e| {
        tracing::error!("get avc parameters failed: {}", e);
        CodecError::Unknown
    })?;
    avc.allowed_picture_types = PICTURE_TYPE_I | PICTURE_TYPE_P;
    avc.profile = AvcProfileType::Baseline;
    avc.b_frames = 0;

    set_avc_fields(&mut avc, format);
    if avc.b_frames != 0 {
        avc.allowed_picture_types |= PICTURE_TYPE_B;
    }
    avc.enable_uep = false;
    avc.enable_fmo = false;
    avc.enable_aso = false;
    avc.enable_rs = false;
    avc.frame_mbs_only = true;
    avc.mbaff = false;
    avc.loop_filter = AvcLoopFilter::Enable;

    component.set_param(&avc).map_err(|e| {
        tracing::error!("failed to set avc parameters: {}", e);
        CodecError::Unknown
    })
}

/// Key frame interval in frames, if the format asks for one.
pub(crate) fn hevc_key_frame_interval(format: &Format) -> Option<u32> {
    let interval = format.get_int(keys::I_FRAME_INTERVAL).filter(|i| *i >= 0)?;
    let frame_rate = format.get_double(keys::FRAME_RATE).filter(|r| *r > 0.0)?;
    if interval == 0 {
        return Some(1);
    }
    Some((f64::from(interval) * frame_rate / 1000.0) as u32)
}

fn setup_hevc(codec: &Codec, format: &Format) -> CodecResult {
    let component = codec.component()?;
    let query = HevcParams {
        port: PortIndex::Output,
        ..Default::default()
    };
    let mut hevc = component.get_param(query).map_err(|e| {
        tracing::error!("get hevc parameters failed: {}", e);
        CodecError::Unknown
    })?;
    if let Some(profile) = format
        .get_int(keys::PROFILE)
        .and_then(HevcProfile::from_raw)
        .and_then(hevc_profile_to_hdi)
    {
        hevc.profile = profile;
        tracing::info!("hevc profile {:?}", profile);
    }
    if let Some(interval) = hevc_key_frame_interval(format) {
        hevc.key_frame_interval = interval;
        tracing::info!("key frame interval {}", interval);
    }
    component.set_param(&hevc).map_err(|e| {
        tracing::error!("failed to set hevc parameters: {}", e);
        CodecError::InvalidVal
    })
}

pub(crate) fn color_aspects(format: &Format) -> ColorAspectsParam {
    let range = match format.get_int(keys::RANGE_FLAG) {
        Some(0) => ColorRange::Limited,
        Some(_) => ColorRange::Full,
        None => ColorRange::Unspecified,
    };
    ColorAspectsParam {
        port: PortIndex::Input,
        range,
        primaries: raw_primary_to_hdi(
            format
                .get_int(keys::COLOR_PRIMARIES)
                .unwrap_or(ColorPrimary::Unspecified.raw()),
        ),
        transfer: raw_transfer_to_hdi(
            format
                .get_int(keys::TRANSFER_CHARACTERISTICS)
                .unwrap_or(TransferCharacteristic::Unspecified.raw()),
        ),
        matrix: raw_matrix_to_hdi(
            format
                .get_int(keys::MATRIX_COEFFICIENTS)
                .unwrap_or(MatrixCoefficient::Unspecified.raw()),
        ),
    }
}

fn set_color_aspects(codec: &Codec, format: &Format) -> CodecResult {
    let param = color_aspects(format);
    codec.component()?.set_cfg(&param).map_err(|e| {
        tracing::error!("failed to set color aspects: {}", e);
        CodecError::Unknown
    })?;
    tracing::info!("set color aspects {:?} succ", param);
    Ok(())
}

pub(crate) fn request_idr_frame(codec: &mut Codec) -> CodecResult {
    let param = IntraRefreshVop {
        port: PortIndex::Output,
        refresh: true,
    };
    codec.component()?.set_cfg(&param).map_err(|e| {
        tracing::error!("failed to request IDR frame: {}", e);
        CodecError::Unknown
    })?;
    tracing::info!("set IDR frame success");
    Ok(())
}

pub(crate) fn on_set_parameters(codec: &mut Codec, format: &Format) -> CodecResult {
    match format.get_int(keys::REQUEST_I_FRAME) {
        Some(request) if request != 0 => request_idr_frame(codec),
        _ => Ok(()),
    }
}

/// Switch the input port to dynamic handles and listen for queued frames.
fn attach_input_surface(codec: &mut Codec, consumer: Arc<dyn Surface>) -> CodecResult {
    let param = UseBufferType {
        port: PortIndex::Input,
        buffer_type: CodecBufferType::DynamicHandle,
    };
    codec.component()?.set_param(&param).map_err(|e| {
        tracing::error!("set dynamic input buffer type failed: {}", e);
        CodecError::Unknown
    })?;
    let handle = codec.handle.downgrade();
    consumer
        .register_consumer_listener(Box::new(move || {
            if let Some(handle) = handle.upgrade() {
                handle.send_async(Msg::GetBufferFromSurface, Duration::ZERO);
            }
        }))
        .map_err(|e| {
            tracing::error!("register consumer listener failed: {}", e);
            CodecError::Unknown
        })?;
    codec.enc.input_surface = Some(consumer);
    codec.enc.pending_surface_frames = 0;
    codec.enc.pending_eos = false;
    Ok(())
}

pub(crate) fn on_create_input_surface(codec: &mut Codec) -> CodecResult<Arc<dyn Surface>> {
    if codec.enc.input_surface.is_some() {
        tracing::error!("input surface already exists");
        return Err(CodecError::InvalidOperation);
    }
    let name = format!("{}_input", codec.component_name);
    let (consumer, producer) = codec
        .ctx
        .surface_allocator
        .create_surface_pair(&name)
        .map_err(|e| {
            tracing::error!("create surface pair failed: {}", e);
            CodecError::Unknown
        })?;
    attach_input_surface(codec, consumer)?;
    tracing::info!("input surface created");
    Ok(producer)
}

pub(crate) fn on_set_input_surface(codec: &mut Codec, surface: Arc<dyn Surface>) -> CodecResult {
    if codec.enc.input_surface.is_some() {
        tracing::error!("input surface already exists");
        return Err(CodecError::InvalidOperation);
    }
    if !surface.is_consumer() {
        tracing::error!("expect a consumer surface but got a producer surface");
        return Err(CodecError::InvalidVal);
    }
    attach_input_surface(codec, surface)?;
    tracing::info!("input surface set");
    Ok(())
}

pub(crate) fn allocate_buffers_on_port(codec: &mut Codec, port: PortIndex) -> CodecResult {
    if port == PortIndex::Input && codec.is_surface_input() {
        allocate_dynamic_input_buffers(codec)
    } else {
        codec.allocate_shared_buffers(port, port == PortIndex::Input)
    }
}

fn allocate_dynamic_input_buffers(codec: &mut Codec) -> CodecResult {
    let component = codec.component()?;
    let query = PortDefinition {
        port: PortIndex::Input,
        ..Default::default()
    };
    let def = component.get_param(query).map_err(|e| {
        tracing::error!("get input port definition failed: {}", e);
        CodecError::InvalidVal
    })?;
    codec.clear_buffer_pool(PortIndex::Input);
    for _ in 0..def.buffer_count_actual {
        let omx = component
            .use_buffer(PortIndex::Input, OmxCodecBuffer::dynamic())
            .map_err(|e| {
                tracing::error!("use dynamic input buffer failed: {}", e);
                CodecError::Unknown
            })?;
        codec.pool_mut(PortIndex::Input).push(BufferInfo {
            owner: BufferOwner::Us,
            omx,
            surface_buffer: None,
            memory: None,
            is_image: true,
        });
    }
    tracing::info!("allocated {} dynamic input slots", def.buffer_count_actual);
    Ok(())
}

fn free_input_slot(codec: &Codec) -> Option<usize> {
    codec
        .pool(PortIndex::Input)
        .iter()
        .position(|info| info.owner == BufferOwner::Us)
}

/// The input surface has a frame queued: wrap it into a free slot.
pub(crate) fn on_get_buffer_from_surface(codec: &mut Codec) {
    let Some(surface) = codec.enc.input_surface.clone() else {
        tracing::warn!("no input surface");
        return;
    };
    if codec.input_eos || codec.enc.pending_eos {
        if let Ok(acquired) = surface.acquire_buffer() {
            tracing::warn!("frame after eos, drop it");
            if let Err(e) = surface.release_buffer(&acquired.buffer, acquired.fence_fd) {
                tracing::warn!("release buffer failed: {}", e);
            }
        }
        return;
    }
    if !codec.buffers_circulating {
        codec.enc.pending_surface_frames += 1;
        tracing::debug!(
            "buffers not circulating, {} frames waiting",
            codec.enc.pending_surface_frames
        );
        return;
    }
    submit_surface_frame(codec, surface.as_ref());
}

/// Buffers started circulating: feed the frames queued meanwhile, then a
/// deferred end of stream once every waiting frame is in.
pub(crate) fn resume_surface_input(codec: &mut Codec) {
    let Some(surface) = codec.enc.input_surface.clone() else {
        return;
    };
    tracing::info!("{} frames waiting in surface", codec.enc.pending_surface_frames);
    while codec.enc.pending_surface_frames > 0 && free_input_slot(codec).is_some() {
        codec.enc.pending_surface_frames -= 1;
        submit_surface_frame(codec, surface.as_ref());
    }
    if codec.enc.pending_surface_frames > 0 || !codec.enc.pending_eos || codec.input_eos {
        return;
    }
    if let Some(idx) = free_input_slot(codec) {
        codec.enc.pending_eos = false;
        if let Err(e) = submit_eos(codec, idx) {
            tracing::error!("submit eos failed: {}", e);
        }
    }
}

/// Drop every frame still waiting in the surface, along with a deferred
/// end of stream.
pub(crate) fn discard_waiting_surface_frames(codec: &mut Codec) {
    let Some(surface) = codec.enc.input_surface.clone() else {
        return;
    };
    let mut dropped = 0;
    while codec.enc.pending_surface_frames > 0 {
        codec.enc.pending_surface_frames -= 1;
        match surface.acquire_buffer() {
            Ok(acquired) => {
                if let Err(e) = surface.release_buffer(&acquired.buffer, acquired.fence_fd) {
                    tracing::warn!("release buffer failed: {}", e);
                }
                dropped += 1;
            }
            Err(e) => {
                tracing::warn!("acquire buffer failed: {}", e);
                break;
            }
        }
    }
    codec.enc.pending_surface_frames = 0;
    codec.enc.pending_eos = false;
    tracing::info!("dropped {} waiting surface frames", dropped);
}

/// Give the frame held by input slot `idx` back to the producer.
pub(crate) fn release_slot_frame(codec: &mut Codec, idx: usize) {
    let Some(info) = codec.pool_mut(PortIndex::Input).get_mut(idx) else {
        return;
    };
    let buffer = info.surface_buffer.take();
    info.omx.handle = None;
    if let (Some(buffer), Some(surface)) = (buffer, &codec.enc.input_surface) {
        if let Err(e) = surface.release_buffer(&buffer, -1) {
            tracing::warn!("release buffer failed: {}", e);
        }
    }
}

/// Acquire the oldest queued frame into a free slot, or count it as waiting.
fn submit_surface_frame(codec: &mut Codec, surface: &dyn Surface) {
    let Some(idx) = free_input_slot(codec) else {
        codec.enc.pending_surface_frames += 1;
        tracing::debug!(
            "no free input slot, {} frames waiting",
            codec.enc.pending_surface_frames
        );
        return;
    };
    let acquired = match surface.acquire_buffer() {
        Ok(acquired) => acquired,
        Err(e) => {
            tracing::error!("acquire buffer failed: {}", e);
            return;
        }
    };
    let buffer = acquired.buffer;
    let filled = buffer
        .format()
        .frame_size(buffer.stride(), buffer.height())
        .min(buffer.memory().size());
    let info = &mut codec.pool_mut(PortIndex::Input)[idx];
    info.omx.handle = Some(buffer.clone());
    info.omx.filled_len = u32::try_from(filled).unwrap_or(u32::MAX);
    info.omx.offset = 0;
    info.omx.fence_fd = acquired.fence_fd;
    info.omx.pts = acquired.timestamp;
    info.omx.flag = 0;
    info.surface_buffer = Some(buffer);
    if let Err(e) = codec.notify_omx_empty(idx) {
        tracing::error!("submit surface frame failed: {}", e);
    }
}

/// The hardware is done with a surface frame: release it to the producer
/// and reuse the slot for anything waiting.
pub(crate) fn on_surface_buffer_done(codec: &mut Codec, id: u32, mode: BufferOperationMode) {
    let Some(idx) = codec.take_back_from_hardware(PortIndex::Input, id) else {
        return;
    };
    tracing::debug!("inBufId = {}", id);
    release_slot_frame(codec, idx);
    if mode != BufferOperationMode::Resubmit || !codec.buffers_circulating {
        return;
    }
    if codec.enc.pending_surface_frames > 0 {
        codec.enc.pending_surface_frames -= 1;
        if let Some(surface) = codec.enc.input_surface.clone() {
            submit_surface_frame(codec, surface.as_ref());
        }
    } else if codec.enc.pending_eos {
        codec.enc.pending_eos = false;
        if let Err(e) = submit_eos(codec, idx) {
            tracing::error!("submit eos failed: {}", e);
        }
    }
}

fn submit_eos(codec: &mut Codec, idx: usize) -> CodecResult {
    let info = &mut codec.pool_mut(PortIndex::Input)[idx];
    info.omx.handle = None;
    info.omx.filled_len = 0;
    info.omx.offset = 0;
    info.omx.flag = BUFFER_FLAG_EOS;
    codec.notify_omx_empty(idx)
}

pub(crate) fn on_signal_end_of_input_stream(codec: &mut Codec) -> CodecResult {
    if !codec.is_surface_input() {
        tracing::error!("can only be called in surface mode");
        return Err(CodecError::InvalidOperation);
    }
    if codec.input_eos || codec.enc.pending_eos {
        tracing::info!("eos already signalled");
        return Ok(());
    }
    if codec.buffers_circulating && codec.enc.pending_surface_frames == 0 {
        if let Some(idx) = free_input_slot(codec) {
            return submit_eos(codec, idx);
        }
    }
    tracing::info!("no free input slot, eos goes out with the next one");
    codec.enc.pending_eos = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p_frames_spacing() {
        assert_eq!(p_frames_spacing(-1, 30.0, 0), u32::MAX - 1);
        assert_eq!(p_frames_spacing(0, 30.0, 0), 0);
        // one second at 30 fps: I + 29 P
        assert_eq!(p_frames_spacing(1000, 30.0, 0), 29);
        assert_eq!(p_frames_spacing(1000, 30.0, 2), 9);
        assert_eq!(p_frames_spacing(10, 30.0, 0), 0);
    }

    #[test]
    fn test_input_buffer_size() {
        assert_eq!(input_buffer_size(1280, 720, PixelFormat::Nv12), 1280 * 768 * 3 / 2);
        assert_eq!(input_buffer_size(100, 100, PixelFormat::Rgba), 128 * 128 * 4);
    }

    #[test]
    fn test_avc_fields_baseline_all_intra() {
        let mut avc = AvcParams {
            allowed_picture_types: PICTURE_TYPE_I | PICTURE_TYPE_P,
            ..Default::default()
        };
        let format = Format::new().with_int(keys::I_FRAME_INTERVAL, 0);
        set_avc_fields(&mut avc, &format);
        assert_eq!(avc.profile, AvcProfileType::Baseline);
        assert_eq!(avc.ref_frames, 1);
        assert_eq!(avc.p_frames, 0);
        assert_eq!(avc.allowed_picture_types, PICTURE_TYPE_I);
        assert!(!avc.entropy_coding_cabac);
    }

    #[test]
    fn test_avc_fields_high_with_b_frames() {
        let mut avc = AvcParams::default();
        let format = Format::new()
            .with_int(keys::PROFILE, AvcProfile::High.raw())
            .with_int(keys::MAX_B_FRAMES, 2)
            .with_int(keys::I_FRAME_INTERVAL, 1000)
            .with_double(keys::FRAME_RATE, 30.0);
        set_avc_fields(&mut avc, &format);
        assert_eq!(avc.profile, AvcProfileType::High);
        assert_eq!(avc.b_frames, 2);
        assert_eq!(avc.ref_frames, 2);
        assert_eq!(avc.p_frames, 9);
        assert!(avc.entropy_coding_cabac);
        assert_eq!(avc.cabac_init_idc, 1);
    }

    #[test]
    fn test_hevc_key_frame_interval() {
        let format = Format::new()
            .with_int(keys::I_FRAME_INTERVAL, 2000)
            .with_double(keys::FRAME_RATE, 25.0);
        assert_eq!(hevc_key_frame_interval(&format), Some(50));
        let all_intra = format.clone().with_int(keys::I_FRAME_INTERVAL, 0);
        assert_eq!(hevc_key_frame_interval(&all_intra), Some(1));
        let no_rate = Format::new().with_int(keys::I_FRAME_INTERVAL, 2000);
        assert_eq!(hevc_key_frame_interval(&no_rate), None);
    }

    #[test]
    fn test_color_aspects_defaults() {
        let param = color_aspects(&Format::new());
        assert_eq!(param.range, ColorRange::Unspecified);
        assert_eq!(param.primaries, hcodec_hdi::ColorPrimaries::Unspecified);

        let full = color_aspects(&Format::new().with_int(keys::RANGE_FLAG, 1));
        assert_eq!(full.range, ColorRange::Full);
    }
}
