//! Fake codec demo - drives a hardware codec instance on the in-process fake driver.
//!
//! Lists the fake driver's capabilities, then decodes (or encodes) a short
//! synthetic stream end to end and logs every produced buffer.
//!
//! Usage:
//!   fake-codec [options]
//!
//! Options:
//!   --encoder          Encode frames read from an input surface instead of decoding
//!   --hevc             Use the HEVC component instead of AVC
//!   --frames <n>       Number of frames to push (default: 8)
//!   --width <px>       Frame width (default: 1280)
//!   --height <px>      Frame height (default: 720)

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::{BufMut, BytesMut};
use hcodec::{
    keys, BufferFlag, CodecBufferInfo, CodecCallback, CodecError, CodecOptions, ErrorType, Format,
    HCodec, HCodecList, HdiContext, PixelFormat,
};
use hcodec_hdi::fake::{
    FakeComponentManager, FakeSurfaceAllocator, FAKE_AVC_DECODER, FAKE_AVC_ENCODER,
    FAKE_HEVC_DECODER, FAKE_HEVC_ENCODER,
};
use hcodec_hdi::{BufferFlushConfig, BufferRequestConfig, GraphicPixelFormat};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

struct Args {
    encoder: bool,
    hevc: bool,
    frames: i64,
    width: i32,
    height: i32,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut result = Args {
        encoder: false,
        hevc: false,
        frames: 8,
        width: 1280,
        height: 720,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--encoder" => result.encoder = true,
            "--hevc" => result.hevc = true,
            "--frames" if i + 1 < args.len() => {
                result.frames = args[i + 1].parse().context("--frames")?;
                i += 1;
            }
            "--width" if i + 1 < args.len() => {
                result.width = args[i + 1].parse().context("--width")?;
                i += 1;
            }
            "--height" if i + 1 < args.len() => {
                result.height = args[i + 1].parse().context("--height")?;
                i += 1;
            }
            other => bail!("unknown argument: {}", other),
        }
        i += 1;
    }
    Ok(result)
}

enum Event {
    Error(ErrorType, CodecError),
    FormatChanged(Format),
    Input(u32),
    Output(u32, CodecBufferInfo, BufferFlag),
}

/// Forwards codec events to the demo's main thread.
struct ChannelCallback(Mutex<Sender<Event>>);

impl ChannelCallback {
    fn send(&self, event: Event) {
        if let Ok(tx) = self.0.lock() {
            let _ = tx.send(event);
        }
    }
}

impl CodecCallback for ChannelCallback {
    fn on_error(&self, error_type: ErrorType, error: CodecError) {
        self.send(Event::Error(error_type, error));
    }

    fn on_output_format_changed(&self, format: &Format) {
        self.send(Event::FormatChanged(format.clone()));
    }

    fn on_input_buffer_available(&self, index: u32) {
        self.send(Event::Input(index));
    }

    fn on_output_buffer_available(&self, index: u32, info: CodecBufferInfo, flag: BufferFlag) {
        self.send(Event::Output(index, info, flag));
    }
}

fn print_capabilities(ctx: &HdiContext) -> Result<()> {
    let caps = HCodecList::capabilities(ctx.manager.as_ref())?;
    println!("Components:");
    for cap in &caps {
        println!(
            "  {:<32} {:?} {} {}x{}..{}x{} formats={:?} modes={:?}",
            cap.codec_name,
            cap.kind,
            cap.mime_type,
            cap.width.min,
            cap.height.min,
            cap.width.max,
            cap.height.max,
            cap.pixel_formats,
            cap.bitrate_modes,
        );
    }
    println!();
    Ok(())
}

/// Synthetic access unit: a start code, a fake NAL header and a pts tag.
fn access_unit(pts: i64) -> BytesMut {
    let mut au = BytesMut::with_capacity(128);
    au.put_slice(&[0, 0, 0, 1]);
    au.put_u8(if pts == 0 { 0x65 } else { 0x41 });
    au.put_i64_le(pts);
    au.put_bytes(0xA5, 128 - au.len());
    au
}

fn next_event(rx: &Receiver<Event>) -> Result<Event> {
    rx.recv_timeout(EVENT_TIMEOUT)
        .context("codec produced no event in time")
}

/// Drain events until end of stream, feeding inputs from `next_input` and
/// releasing every output. Returns the number of frames produced.
fn pump(
    codec: &HCodec,
    rx: &Receiver<Event>,
    mut next_input: impl FnMut(&HCodec, u32) -> Result<()>,
) -> Result<usize> {
    let mut produced = 0;
    loop {
        match next_event(rx)? {
            Event::Input(index) => next_input(codec, index)?,
            Event::Output(index, info, flag) => {
                let memory = codec.get_output_buffer(index)?;
                let tag = memory.read_at(0, 8);
                tracing::info!(
                    "output #{} pts={} size={} flag={} tag={:02x?}",
                    index,
                    info.presentation_time_us,
                    info.size,
                    flag,
                    tag
                );
                codec.release_output_buffer(index)?;
                if flag.contains(BufferFlag::EOS) {
                    return Ok(produced);
                }
                produced += 1;
            }
            Event::FormatChanged(format) => tracing::info!("output format changed: {}", format),
            Event::Error(kind, error) => bail!("codec error {:?}: {}", kind, error),
        }
    }
}

fn decode(ctx: HdiContext, args: &Args, format: &Format) -> Result<usize> {
    let name = if args.hevc {
        FAKE_HEVC_DECODER
    } else {
        FAKE_AVC_DECODER
    };
    let codec = HCodec::create(name, ctx, CodecOptions::new())?;
    let (tx, rx) = mpsc::channel();
    codec.set_callback(Arc::new(ChannelCallback(Mutex::new(tx))))?;
    codec.configure(format)?;
    codec.start()?;
    tracing::info!("input format: {}", codec.input_format()?);

    let mut pts = 0;
    let produced = pump(&codec, &rx, |codec, index| {
        if pts > args.frames {
            // EOS already queued; keep the buffer
            return Ok(());
        }
        let memory = codec.get_input_buffer(index)?;
        let (size, flag) = if pts == args.frames {
            (0, BufferFlag::EOS)
        } else {
            let au = access_unit(pts);
            let written = memory.write_at(0, &au);
            (i32::try_from(written)?, BufferFlag::NONE)
        };
        let info = CodecBufferInfo {
            presentation_time_us: pts,
            size,
            offset: 0,
        };
        codec.queue_input_buffer(index, info, flag)?;
        pts += 1;
        Ok(())
    })?;
    codec.release()?;
    Ok(produced)
}

fn encode(ctx: HdiContext, args: &Args, format: &Format) -> Result<usize> {
    let name = if args.hevc {
        FAKE_HEVC_ENCODER
    } else {
        FAKE_AVC_ENCODER
    };
    let codec = HCodec::create(name, ctx, CodecOptions::new())?;
    let (tx, rx) = mpsc::channel();
    codec.set_callback(Arc::new(ChannelCallback(Mutex::new(tx))))?;
    let producer = codec.create_input_surface()?;
    codec.configure(format)?;
    codec.start()?;
    tracing::info!("output format: {}", codec.output_format()?);

    producer.set_queue_size(u32::try_from(args.frames.max(1))?)?;
    let request = BufferRequestConfig {
        width: u32::try_from(args.width)?,
        height: u32::try_from(args.height)?,
        stride_alignment: 32,
        format: GraphicPixelFormat::Ycbcr420Sp,
        ..Default::default()
    };
    for pts in 0..args.frames {
        let buffer = producer.request_buffer(&request)?;
        let flush = BufferFlushConfig {
            timestamp: pts,
            ..Default::default()
        };
        producer.flush_buffer(&buffer, &flush)?;
    }
    codec.notify_eos()?;

    let produced = pump(&codec, &rx, |_, index| {
        tracing::warn!("unexpected input buffer #{} in surface mode", index);
        Ok(())
    })?;
    codec.release()?;
    Ok(produced)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hcodec=info".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let args = parse_args()?;

    println!();
    println!("========================================");
    println!("Fake Codec");
    println!("========================================");
    println!(
        "Mode:   {} {}",
        if args.hevc { "HEVC" } else { "AVC" },
        if args.encoder { "encoder" } else { "decoder" }
    );
    println!("Size:   {}x{}", args.width, args.height);
    println!("Frames: {}", args.frames);
    println!("========================================");
    println!();

    let ctx = HdiContext::new(
        Arc::new(FakeComponentManager::new()),
        Arc::new(FakeSurfaceAllocator),
    );
    print_capabilities(&ctx)?;

    let format = Format::new()
        .with_int(keys::WIDTH, args.width)
        .with_int(keys::HEIGHT, args.height)
        .with_int(keys::PIXEL_FORMAT, PixelFormat::Nv12.raw());

    let produced = if args.encoder {
        encode(ctx, &args, &format)?
    } else {
        decode(ctx, &args, &format)?
    };
    println!("Produced {} frames", produced);
    Ok(())
}
