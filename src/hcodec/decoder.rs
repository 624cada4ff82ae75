//! Decoder policy: ashmem input, ashmem or display-surface output.

use std::sync::Arc;

use hcodec_hdi::{
    BufferHandleUsage, CodecBufferType, ComponentExt, GraphicPixelFormat, OmxCodecBuffer,
    OutputCrop, PortIndex, Rect, Surface, UseBufferType, BUFFER_USAGE_CPU_READ,
    BUFFER_USAGE_CPU_WRITE, BUFFER_USAGE_MEM_DMA,
};

use super::buffer::{BufferInfo, BufferOperationMode, BufferOwner};
use super::codec::{Codec, PortInfo, SharedBufferFormat};
use super::msg::Msg;
use crate::convert::{omx_to_formats, pixel_to_graphic, rotation_to_transform};
use crate::format::keys;
use crate::{CodecError, CodecResult, Format, PixelFormat};

/// Row alignment requested for display buffers.
pub(crate) const STRIDE_ALIGNMENT: u32 = 32;

pub(crate) const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Width, height and client pixel format, all mandatory for configuration.
pub(crate) fn required_geometry(format: &Format) -> CodecResult<(u32, u32, PixelFormat)> {
    let width = match format.get_int(keys::WIDTH) {
        Some(w) if w > 0 => w.unsigned_abs(),
        _ => {
            tracing::error!("format should contain width");
            return Err(CodecError::InvalidVal);
        }
    };
    let height = match format.get_int(keys::HEIGHT) {
        Some(h) if h > 0 => h.unsigned_abs(),
        _ => {
            tracing::error!("format should contain height");
            return Err(CodecError::InvalidVal);
        }
    };
    let Some(raw) = format.get_int(keys::PIXEL_FORMAT) else {
        tracing::error!("format should contain pixel_format");
        return Err(CodecError::InvalidVal);
    };
    let Some(pixel_fmt) = PixelFormat::from_raw(raw) else {
        tracing::error!("unknown pixel format {}", raw);
        return Err(CodecError::InvalidVal);
    };
    Ok((width, height, pixel_fmt))
}

pub(crate) fn frame_rate(format: &Format) -> f64 {
    match format.get_double(keys::FRAME_RATE) {
        Some(rate) => {
            tracing::info!("user set frame rate {:.2}", rate);
            rate
        }
        None => DEFAULT_FRAME_RATE,
    }
}

pub(crate) fn on_configure(codec: &mut Codec, format: &Format) -> CodecResult {
    let mut config = format.clone();
    let (width, height, pixel_fmt) = required_geometry(format)?;
    let display_fmt = pixel_to_graphic(pixel_fmt);
    config.set_int(keys::DISPLAY_PIXEL_FORMAT, display_fmt.raw());
    codec.config_format = Some(config);
    tracing::info!(
        "user set width {}, height {}, pixel format {:?}, display format {:?}",
        width,
        height,
        pixel_fmt,
        display_fmt
    );
    let frame_rate = frame_rate(format);

    let input_buf_size = format
        .get_int(keys::MAX_INPUT_SIZE)
        .filter(|size| *size > 0)
        .map(i32::unsigned_abs);
    let input = PortInfo {
        width,
        height,
        input_buf_size,
        coding: codec.coding_type,
        pixel_fmt: GraphicPixelFormat::Butt,
        frame_rate,
    };
    codec.set_video_port_info(PortIndex::Input, &input)?;

    let output = PortInfo {
        width,
        height,
        input_buf_size: None,
        coding: hcodec_hdi::CodingType::Unused,
        pixel_fmt: display_fmt,
        frame_rate,
    };
    codec.set_video_port_info(PortIndex::Output, &output)
}

pub(crate) fn update_in_port_format(codec: &mut Codec) -> CodecResult {
    let def = codec.get_port_definition(PortIndex::Input)?;
    let format = codec.input_format.get_or_insert_with(Format::new);
    put_u32(format, keys::WIDTH, def.video.frame_width);
    put_u32(format, keys::HEIGHT, def.video.frame_height);
    format.set_int(keys::STRIDE, def.video.stride);
    Ok(())
}

pub(crate) fn update_out_port_format(codec: &mut Codec) -> CodecResult {
    let def = codec.get_port_definition(PortIndex::Output)?;
    if def.buffer_count_actual == 0 {
        tracing::error!("invalid buffer count");
        return Err(CodecError::Unknown);
    }
    let (w, h) = (def.video.frame_width, def.video.frame_height);
    let (display_fmt, pixel_fmt) = match omx_to_formats(def.video.color_format) {
        Some(formats) => formats,
        None => {
            tracing::warn!(
                "omx color format {} is invalid, use configured format instead",
                def.video.color_format.0
            );
            configured_formats(codec.config_format.as_ref())?
        }
    };

    let usage = output_usage(codec);
    let dec = &mut codec.dec;
    dec.out_buffer_count = def.buffer_count_actual;
    dec.request_cfg.width = w;
    dec.request_cfg.height = h;
    dec.request_cfg.stride_alignment = STRIDE_ALIGNMENT;
    dec.request_cfg.format = display_fmt;
    dec.request_cfg.usage = usage;
    let crop = codec
        .component()
        .ok()
        .and_then(|component| {
            let query = OutputCrop {
                port: PortIndex::Output,
                ..Default::default()
            };
            component
                .get_cfg(query)
                .map_err(|e| tracing::warn!("get crop failed ({}), use default", e))
                .ok()
        })
        .and_then(|crop| valid_crop(&crop, w, h));
    codec.dec.flush_cfg.damage = crop.unwrap_or_else(|| full_frame(w, h));
    tracing::info!("crop rect {:?}", codec.dec.flush_cfg.damage);

    let format = codec.output_format.get_or_insert_with(Format::new);
    put_u32(format, keys::WIDTH, w);
    put_u32(format, keys::HEIGHT, h);
    format.set_int(keys::PIXEL_FORMAT, pixel_fmt.raw());

    codec.shared_buffer_format = Some(SharedBufferFormat {
        width: w,
        height: h,
        stride: def.video.stride,
    });
    Ok(())
}

fn put_u32(format: &mut Format, key: &str, value: u32) {
    format.set_int(key, i32::try_from(value).unwrap_or(i32::MAX));
}

fn configured_formats(config: Option<&Format>) -> CodecResult<(GraphicPixelFormat, PixelFormat)> {
    let config = config.ok_or(CodecError::Unknown)?;
    let display = config
        .get_int(keys::DISPLAY_PIXEL_FORMAT)
        .and_then(GraphicPixelFormat::from_raw);
    let pixel = config.get_int(keys::PIXEL_FORMAT).and_then(PixelFormat::from_raw);
    match (display, pixel) {
        (Some(display), Some(pixel)) => Ok((display, pixel)),
        _ => {
            tracing::error!("no usable pixel format in the configuration");
            Err(CodecError::Unknown)
        }
    }
}

fn output_usage(codec: &Codec) -> u64 {
    let query = BufferHandleUsage {
        port: PortIndex::Output,
        usage: 0,
    };
    match codec.component().map(|c| c.get_param(query)) {
        Ok(Ok(param)) => param.usage,
        _ => {
            tracing::warn!("get buffer handle usage failed, use default");
            BUFFER_USAGE_CPU_READ | BUFFER_USAGE_CPU_WRITE | BUFFER_USAGE_MEM_DMA
        }
    }
}

fn full_frame(w: u32, h: u32) -> Rect {
    Rect {
        x: 0,
        y: 0,
        w: i32::try_from(w).unwrap_or(i32::MAX),
        h: i32::try_from(h).unwrap_or(i32::MAX),
    }
}

/// The driver's crop as a rectangle, if it lies within a `w` x `h` frame.
pub(crate) fn valid_crop(crop: &OutputCrop, w: u32, h: u32) -> Option<Rect> {
    let inside = crop.left >= 0
        && crop.top >= 0
        && crop.width != 0
        && crop.height != 0
        && i64::from(crop.left) + i64::from(crop.width) <= i64::from(w)
        && i64::from(crop.top) + i64::from(crop.height) <= i64::from(h);
    if !inside {
        tracing::warn!("wrong crop {:?} vs. frame {}x{}, use default", crop, w, h);
        return None;
    }
    Some(Rect {
        x: crop.left,
        y: crop.top,
        w: i32::try_from(crop.width).ok()?,
        h: i32::try_from(crop.height).ok()?,
    })
}

pub(crate) fn on_set_output_surface(codec: &mut Codec, surface: Arc<dyn Surface>) -> CodecResult {
    if surface.is_consumer() {
        tracing::error!("expect a producer surface but got a consumer surface");
        return Err(CodecError::InvalidVal);
    }
    let handle = codec.handle.downgrade();
    surface
        .register_release_listener(Box::new(move || {
            if let Some(handle) = handle.upgrade() {
                handle.send_async(Msg::GetBufferFromSurface, std::time::Duration::ZERO);
            }
        }))
        .map_err(|e| {
            tracing::error!("register release listener failed: {}", e);
            CodecError::Unknown
        })?;
    let component = codec.component()?;
    let param = UseBufferType {
        port: PortIndex::Output,
        buffer_type: CodecBufferType::Handle,
    };
    component.set_param(&param).map_err(|e| {
        tracing::error!("component does not support handle buffers: {}", e);
        CodecError::InvalidOperation
    })?;
    codec.dec.output_surface = Some(surface);
    tracing::info!("output surface set");
    Ok(())
}

pub(crate) fn on_set_parameters(codec: &mut Codec, format: &Format) -> CodecResult {
    let Some(surface) = &codec.dec.output_surface else {
        return Ok(());
    };
    let Some(angle) = format.get_int(keys::ROTATION_ANGLE) else {
        return Ok(());
    };
    let transform = rotation_to_transform(angle).ok_or(CodecError::InvalidVal)?;
    surface.set_transform(transform).map_err(|e| {
        tracing::error!("set rotation {} to surface failed: {}", angle, e);
        CodecError::Unknown
    })?;
    tracing::info!("set rotation {} to surface", angle);
    Ok(())
}

/// Surface mode takes the configured rotation along.
pub(crate) fn ready_to_start(codec: &mut Codec) {
    if codec.dec.output_surface.is_none() {
        tracing::info!("buffer mode");
        return;
    }
    tracing::info!("surface mode");
    if let Some(config) = codec.config_format.clone() {
        if let Err(e) = on_set_parameters(codec, &config) {
            tracing::warn!("apply configured parameters failed: {}", e);
        }
    }
}

pub(crate) fn allocate_buffers_on_port(codec: &mut Codec, port: PortIndex) -> CodecResult {
    if port == PortIndex::Output && codec.is_surface_output() {
        allocate_output_buffers_from_surface(codec)
    } else {
        codec.allocate_shared_buffers(port, port == PortIndex::Output)
    }
}

fn allocate_output_buffers_from_surface(codec: &mut Codec) -> CodecResult {
    let component = codec.component()?;
    let Some(surface) = codec.dec.output_surface.clone() else {
        return Err(CodecError::InvalidOperation);
    };
    surface
        .set_queue_size(codec.dec.out_buffer_count)
        .map_err(|e| {
            tracing::error!("set surface queue size failed: {}", e);
            CodecError::InvalidVal
        })?;
    if !codec.pool(PortIndex::Output).is_empty() {
        tracing::warn!("output buffer pool should be empty");
    }
    codec.pool_mut(PortIndex::Output).clear();
    for _ in 0..codec.dec.out_buffer_count {
        let buffer = surface.request_buffer(&codec.dec.request_cfg).map_err(|e| {
            tracing::error!("request buffer failed: {}", e);
            CodecError::Unknown
        })?;
        let desc = OmxCodecBuffer::from_surface_buffer(buffer.clone());
        let omx = match component.use_buffer(PortIndex::Output, desc) {
            Ok(omx) => omx,
            Err(e) => {
                tracing::error!("use output buffer failed: {}", e);
                if let Err(e) = surface.cancel_buffer(&buffer) {
                    tracing::warn!("cancel buffer failed: {}", e);
                }
                return Err(CodecError::NoMemory);
            }
        };
        codec.pool_mut(PortIndex::Output).push(BufferInfo {
            owner: BufferOwner::Us,
            omx,
            surface_buffer: Some(buffer),
            memory: None,
            is_image: true,
        });
    }
    tracing::info!("allocated {} surface buffers", codec.dec.out_buffer_count);
    Ok(())
}

/// Give output slot `idx` back to the display queue unless it is there already.
pub(crate) fn cancel_buffer_to_surface(codec: &mut Codec, idx: usize) {
    let Some(surface) = codec.dec.output_surface.clone() else {
        return;
    };
    let info = &mut codec.pool_mut(PortIndex::Output)[idx];
    if info.owner == BufferOwner::Surface {
        return;
    }
    tracing::debug!("outBufId = {}", info.id());
    if let Some(buffer) = &info.surface_buffer {
        if let Err(e) = surface.cancel_buffer(buffer) {
            tracing::warn!("buffer {} cancel failed: {}", info.id(), e);
        }
    }
    // even if the cancel failed
    info.owner = BufferOwner::Surface;
}

/// The display released a buffer: match it to its slot and refill it.
pub(crate) fn on_get_buffer_from_surface(codec: &mut Codec) {
    let Some(surface) = codec.dec.output_surface.clone() else {
        tracing::warn!("no output surface");
        return;
    };
    let buffer = match surface.request_buffer(&codec.dec.request_cfg) {
        Ok(buffer) => buffer,
        Err(e) => {
            tracing::warn!("request buffer failed: {}", e);
            return;
        }
    };
    let slot = codec.pool(PortIndex::Output).iter().position(|info| {
        info.owner == BufferOwner::Surface
            && info
                .surface_buffer
                .as_ref()
                .is_some_and(|b| b.same_handle(&buffer))
    });
    if let Some(idx) = slot {
        tracing::debug!("outBufId = {}", codec.pool(PortIndex::Output)[idx].id());
        if codec.notify_omx_fill(idx).is_ok() {
            return;
        }
    }
    tracing::warn!("cannot find slot, cancel it");
    if let Err(e) = surface.cancel_buffer(&buffer) {
        tracing::warn!("cancel buffer failed: {}", e);
    }
}

pub(crate) fn on_user_render_output_buffer(
    codec: &mut Codec,
    id: u32,
    mode: BufferOperationMode,
) -> CodecResult {
    let Some(surface) = codec.dec.output_surface.clone() else {
        tracing::error!("can only render in surface mode");
        return Err(CodecError::InvalidOperation);
    };
    tracing::debug!("outBufId = {}", id);
    let idx = codec.user_buffer_index(PortIndex::Output, id)?;
    codec.pool_mut(PortIndex::Output)[idx].owner = BufferOwner::Us;
    match mode {
        BufferOperationMode::Keep => Ok(()),
        BufferOperationMode::Resubmit => {
            if codec.output_eos {
                tracing::info!("output eos, keep this buffer");
                return Ok(());
            }
            let pts = codec.pool(PortIndex::Output)[idx].omx.pts;
            codec.dec.flush_cfg.timestamp = pts;
            let flush_cfg = codec.dec.flush_cfg;
            let info = &mut codec.pool_mut(PortIndex::Output)[idx];
            let Some(buffer) = &info.surface_buffer else {
                tracing::error!("output buffer {} has no graphic buffer", id);
                return Err(CodecError::Unknown);
            };
            surface.flush_buffer(buffer, &flush_cfg).map_err(|e| {
                tracing::error!("flush buffer failed: {}", e);
                CodecError::Unknown
            })?;
            tracing::debug!("outBufId = {}, render succ, pts = {}", id, pts);
            info.owner = BufferOwner::Surface;
            Ok(())
        }
        BufferOperationMode::Free => {
            codec.erase_buffer_from_pool(PortIndex::Output, idx);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_geometry() {
        let format = Format::new()
            .with_int(keys::WIDTH, 1024)
            .with_int(keys::HEIGHT, 768)
            .with_int(keys::PIXEL_FORMAT, PixelFormat::Nv12.raw());
        assert_eq!(required_geometry(&format), Ok((1024, 768, PixelFormat::Nv12)));

        let no_height = Format::new()
            .with_int(keys::WIDTH, 1024)
            .with_int(keys::PIXEL_FORMAT, PixelFormat::Nv12.raw());
        assert_eq!(required_geometry(&no_height), Err(CodecError::InvalidVal));

        let negative = format.clone().with_int(keys::WIDTH, -1);
        assert_eq!(required_geometry(&negative), Err(CodecError::InvalidVal));

        let unknown_pixel = format.with_int(keys::PIXEL_FORMAT, 99);
        assert_eq!(required_geometry(&unknown_pixel), Err(CodecError::InvalidVal));
    }

    #[test]
    fn test_frame_rate_default() {
        assert_eq!(frame_rate(&Format::new()), DEFAULT_FRAME_RATE);
        assert_eq!(frame_rate(&Format::new().with_double(keys::FRAME_RATE, 60.0)), 60.0);
    }

    #[test]
    fn test_valid_crop() {
        let crop = OutputCrop {
            port: PortIndex::Output,
            left: 0,
            top: 4,
            width: 1920,
            height: 1076,
        };
        assert_eq!(
            valid_crop(&crop, 1920, 1080),
            Some(Rect {
                x: 0,
                y: 4,
                w: 1920,
                h: 1076
            })
        );
        let too_tall = OutputCrop { top: 8, ..crop };
        assert_eq!(valid_crop(&too_tall, 1920, 1080), None);
        let empty = OutputCrop { width: 0, ..crop };
        assert_eq!(valid_crop(&empty, 1920, 1080), None);
        let negative = OutputCrop { left: -1, ..crop };
        assert_eq!(valid_crop(&negative, 1920, 1080), None);
    }

    #[test]
    fn test_configured_formats_fallback() {
        let config = Format::new()
            .with_int(keys::PIXEL_FORMAT, PixelFormat::Nv21.raw())
            .with_int(keys::DISPLAY_PIXEL_FORMAT, GraphicPixelFormat::Ycrcb420Sp.raw());
        assert_eq!(
            configured_formats(Some(&config)),
            Ok((GraphicPixelFormat::Ycrcb420Sp, PixelFormat::Nv21))
        );
        assert_eq!(configured_formats(None), Err(CodecError::Unknown));
    }
}
