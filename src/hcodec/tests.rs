//! End-to-end tests against the in-process fake driver.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hcodec_hdi::fake::{
    FakeComponentManager, FakeSurface, FakeSurfaceAllocator, FAKE_AVC_DECODER, FAKE_AVC_ENCODER,
    FAKE_HEVC_ENCODER, FAKE_MAX_INSTANCES,
};
use hcodec_hdi::{
    BufferFlushConfig, BufferRequestConfig, GraphicPixelFormat, OmxState, ParamIndex, PortIndex,
    TransformType,
};

use super::*;
use crate::{BitrateMode, ErrorType, PixelFormat};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Event {
    Error(ErrorType, CodecError),
    FormatChanged(Format),
    Input(u32),
    Output(u32, CodecBufferInfo, BufferFlag),
}

struct ChannelCallback(Mutex<Sender<Event>>);

impl ChannelCallback {
    fn send(&self, event: Event) {
        let _ = self.0.lock().unwrap().send(event);
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

fn options() -> CodecOptions {
    CodecOptions::new()
        .stuck_timeout(Duration::from_secs(2))
        .sync_timeout(Duration::from_secs(10))
}

fn create(fake: &Arc<FakeComponentManager>, name: &str) -> CodecResult<HCodec> {
    create_with(fake, name, options())
}

fn create_with(
    fake: &Arc<FakeComponentManager>,
    name: &str,
    options: CodecOptions,
) -> CodecResult<HCodec> {
    let ctx = HdiContext::new(fake.clone(), Arc::new(FakeSurfaceAllocator));
    HCodec::create(name, ctx, options)
}

fn listen(codec: &HCodec) -> Receiver<Event> {
    let (tx, rx) = mpsc::channel();
    codec
        .set_callback(Arc::new(ChannelCallback(Mutex::new(tx))))
        .unwrap();
    rx
}

fn video_format(width: i32, height: i32) -> Format {
    Format::new()
        .with_int(keys::WIDTH, width)
        .with_int(keys::HEIGHT, height)
        .with_int(keys::PIXEL_FORMAT, PixelFormat::Nv12.raw())
}

fn next_event(rx: &Receiver<Event>) -> Event {
    rx.recv_timeout(WAIT).expect("no event in time")
}

fn wait_inputs(rx: &Receiver<Event>, count: usize) -> Vec<u32> {
    let mut ids = Vec::new();
    while ids.len() < count {
        match next_event(rx) {
            Event::Input(id) => ids.push(id),
            other => panic!("unexpected {:?}", other),
        }
    }
    ids
}

/// Next output event; input events seen on the way are appended to `inputs`.
fn wait_output(rx: &Receiver<Event>, inputs: &mut Vec<u32>) -> (u32, CodecBufferInfo, BufferFlag) {
    loop {
        match next_event(rx) {
            Event::Input(id) => inputs.push(id),
            Event::Output(id, info, flag) => return (id, info, flag),
            other => panic!("unexpected {:?}", other),
        }
    }
}

fn queue_access_unit(codec: &HCodec, id: u32, pts: i64) {
    let memory = codec.get_input_buffer(id).unwrap();
    let payload = vec![0xA5_u8; 100];
    assert_eq!(memory.write_at(0, &payload), payload.len());
    let info = CodecBufferInfo {
        presentation_time_us: pts,
        size: 100,
        offset: 0,
    };
    codec.queue_input_buffer(id, info, BufferFlag::NONE).unwrap();
}

/// Decoder that is configured, started and has handed out every input.
fn running_decoder(fake: &Arc<FakeComponentManager>) -> (HCodec, Receiver<Event>, Vec<u32>) {
    running_decoder_with(fake, options())
}

fn running_decoder_with(
    fake: &Arc<FakeComponentManager>,
    options: CodecOptions,
) -> (HCodec, Receiver<Event>, Vec<u32>) {
    let codec = create_with(fake, FAKE_AVC_DECODER, options).unwrap();
    let rx = listen(&codec);
    codec.configure(&video_format(1024, 768)).unwrap();
    codec.start().unwrap();
    let inputs = wait_inputs(&rx, 4);
    (codec, rx, inputs)
}

#[test]
fn test_decoder_configure_and_start() {
    let fake = Arc::new(FakeComponentManager::new());
    let (codec, _rx, inputs) = running_decoder(&fake);
    assert!(!codec.is_encoder());
    assert_eq!(codec.name(), FAKE_AVC_DECODER);
    assert_eq!(inputs.len(), 4);

    let output = codec.output_format().unwrap();
    assert_eq!(output.get_int(keys::WIDTH), Some(1024));
    assert_eq!(output.get_int(keys::HEIGHT), Some(768));
    assert_eq!(output.get_int(keys::PIXEL_FORMAT), Some(PixelFormat::Nv12.raw()));
    assert_eq!(output.get_string(keys::CODEC_NAME), Some(FAKE_AVC_DECODER));
    let input = codec.input_format().unwrap();
    assert_eq!(input.get_int(keys::WIDTH), Some(1024));

    let component = fake.last_component().unwrap();
    assert_eq!(component.omx_state(), OmxState::Executing);
    assert_eq!(component.registered_buffers(PortIndex::Input), 4);
    assert_eq!(component.registered_buffers(PortIndex::Output), 4);
}

#[test]
fn test_decode_one_frame() {
    let fake = Arc::new(FakeComponentManager::new());
    let (codec, rx, mut inputs) = running_decoder(&fake);
    let id = inputs.remove(0);
    queue_access_unit(&codec, id, 1000);

    let (out, info, flag) = wait_output(&rx, &mut inputs);
    assert_eq!(info.presentation_time_us, 1000);
    assert_eq!(info.size, 1024 * 768 * 3 / 2);
    assert!(flag.contains(BufferFlag::SYNC_FRAME));
    let memory = codec.get_output_buffer(out).unwrap();
    assert_eq!(memory.read_at(0, 8), 1000_i64.to_le_bytes().to_vec());
    codec.release_output_buffer(out).unwrap();
    assert_eq!(
        codec.release_output_buffer(out).unwrap_err(),
        CodecError::InvalidState
    );
}

#[test]
fn test_unknown_component() {
    let fake = Arc::new(FakeComponentManager::new());
    assert_eq!(
        create(&fake, "OMX.fake.video.decoder.vp9").err(),
        Some(CodecError::InvalidVal)
    );
}

#[test]
fn test_configure_requires_geometry() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_DECODER).unwrap();
    let no_pixel_format = Format::new()
        .with_int(keys::WIDTH, 640)
        .with_int(keys::HEIGHT, 480);
    assert_eq!(
        codec.configure(&no_pixel_format).unwrap_err(),
        CodecError::InvalidVal
    );
    assert_eq!(codec.output_format().unwrap_err(), CodecError::Unknown);
}

#[test]
fn test_configure_rejects_unrepresentable_frame_rate() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_DECODER).unwrap();
    for rate in [-1.0, 0.0, 1e12, f64::NAN] {
        let format = video_format(640, 480).with_double(keys::FRAME_RATE, rate);
        assert_eq!(codec.configure(&format).unwrap_err(), CodecError::InvalidVal);
    }

    let encoder = create(&fake, FAKE_AVC_ENCODER).unwrap();
    let format = video_format(640, 480).with_double(keys::FRAME_RATE, 1e12);
    assert_eq!(encoder.configure(&format).unwrap_err(), CodecError::InvalidVal);

    let format = video_format(640, 480).with_double(keys::FRAME_RATE, 60.0);
    codec.configure(&format).unwrap();
    assert_eq!(codec.input_format().unwrap().get_int(keys::WIDTH), Some(640));
}

#[test]
fn test_start_needs_callback_and_configuration() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_DECODER).unwrap();
    codec.configure(&video_format(640, 480)).unwrap();
    assert_eq!(codec.start().unwrap_err(), CodecError::InvalidOperation);

    let other = create(&fake, FAKE_AVC_DECODER).unwrap();
    let _rx = listen(&other);
    assert_eq!(other.start().unwrap_err(), CodecError::InvalidOperation);
}

#[test]
fn test_stop_and_release_are_idempotent() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_DECODER).unwrap();
    let rx = listen(&codec);
    codec.configure(&video_format(640, 480)).unwrap();
    codec.stop().unwrap();

    codec.start().unwrap();
    wait_inputs(&rx, 4);
    codec.stop().unwrap();
    codec.stop().unwrap();
    let component = fake.last_component().unwrap();
    assert_eq!(component.omx_state(), OmxState::Loaded);
    assert_eq!(component.registered_buffers(PortIndex::Input), 0);

    // the configuration survives a stop
    codec.start().unwrap();
    wait_inputs(&rx, 4);

    codec.release().unwrap();
    codec.release().unwrap();
    assert_eq!(fake.live_instances(FAKE_AVC_DECODER), 0);
    assert_eq!(codec.start().unwrap_err(), CodecError::InvalidState);
}

#[test]
fn test_reset_forgets_configuration() {
    let fake = Arc::new(FakeComponentManager::new());
    let (codec, rx, _inputs) = running_decoder(&fake);
    codec.reset().unwrap();
    assert_eq!(fake.live_instances(FAKE_AVC_DECODER), 1);
    assert_eq!(codec.start().unwrap_err(), CodecError::InvalidOperation);

    // the callback is kept
    codec.configure(&video_format(320, 240)).unwrap();
    codec.start().unwrap();
    wait_inputs(&rx, 4);
}

#[test]
fn test_instance_limit() {
    let fake = Arc::new(FakeComponentManager::new());
    let codecs: Vec<HCodec> = (0..FAKE_MAX_INSTANCES)
        .map(|_| create(&fake, FAKE_AVC_DECODER).unwrap())
        .collect();
    assert_eq!(
        create(&fake, FAKE_AVC_DECODER).err(),
        Some(CodecError::Unknown)
    );
    assert_eq!(fake.live_instances(FAKE_AVC_DECODER), codecs.len());
    drop(codecs);
    assert_eq!(fake.live_instances(FAKE_AVC_DECODER), 0);
    create(&fake, FAKE_AVC_DECODER).unwrap();
}

#[test]
fn test_buffer_ownership_is_enforced() {
    let fake = Arc::new(FakeComponentManager::new());
    let (codec, _rx, inputs) = running_decoder(&fake);
    let max_input = *inputs.iter().max().unwrap();
    // outputs are registered after the inputs and sit with the hardware
    let output = max_input + 1;
    assert_eq!(
        codec.get_output_buffer(output).unwrap_err(),
        CodecError::InvalidState
    );
    assert_eq!(
        codec.release_output_buffer(output).unwrap_err(),
        CodecError::InvalidState
    );
    assert_eq!(
        codec.get_input_buffer(output).unwrap_err(),
        CodecError::InvalidVal
    );
    let oversized = CodecBufferInfo {
        presentation_time_us: 0,
        size: i32::MAX,
        offset: 0,
    };
    assert_eq!(
        codec
            .queue_input_buffer(inputs[0], oversized, BufferFlag::NONE)
            .unwrap_err(),
        CodecError::InvalidVal
    );
}

#[test]
fn test_queue_after_eos_keeps_buffer() {
    let fake = Arc::new(FakeComponentManager::new());
    let (codec, rx, mut inputs) = running_decoder(&fake);
    let eos = CodecBufferInfo::default();
    codec
        .queue_input_buffer(inputs[0], eos, BufferFlag::EOS)
        .unwrap();
    let late = inputs[1];
    queue_access_unit(&codec, late, 5);
    assert_eq!(
        codec.get_input_buffer(late).unwrap_err(),
        CodecError::InvalidState
    );

    let (_, info, flag) = wait_output(&rx, &mut inputs);
    assert!(flag.contains(BufferFlag::EOS));
    assert_eq!(info.size, 0);
}

#[test]
fn test_flush_then_resume() {
    let fake = Arc::new(FakeComponentManager::new());
    let (codec, rx, _inputs) = running_decoder(&fake);
    codec.flush().unwrap();
    codec.start().unwrap();
    let inputs = wait_inputs(&rx, 4);
    queue_access_unit(&codec, inputs[0], 7);
    let mut seen = Vec::new();
    let (_, info, _) = wait_output(&rx, &mut seen);
    assert_eq!(info.presentation_time_us, 7);
}

#[test]
fn test_output_port_settings_change() {
    let fake = Arc::new(FakeComponentManager::new());
    let (codec, rx, mut inputs) = running_decoder(&fake);
    fake.last_component()
        .unwrap()
        .trigger_port_settings_changed(1280, 720);
    match next_event(&rx) {
        Event::FormatChanged(format) => {
            assert_eq!(format.get_int(keys::WIDTH), Some(1280));
            assert_eq!(format.get_int(keys::HEIGHT), Some(720));
        }
        other => panic!("unexpected {:?}", other),
    }
    // deferred until the output port is back
    let output = codec.output_format().unwrap();
    assert_eq!(output.get_int(keys::WIDTH), Some(1280));

    let id = inputs.remove(0);
    queue_access_unit(&codec, id, 11);
    let (_, info, _) = wait_output(&rx, &mut inputs);
    assert_eq!(info.size, 1280 * 720 * 3 / 2);
}

#[test]
fn test_driver_error_is_reported() {
    let fake = Arc::new(FakeComponentManager::new());
    let (_codec, rx, _inputs) = running_decoder(&fake);
    fake.last_component().unwrap().trigger_error(-1);
    match next_event(&rx) {
        Event::Error(ErrorType::Internal, CodecError::ServiceDied) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_stuck_start_times_out() {
    let fake = Arc::new(FakeComponentManager::new());
    let ctx = HdiContext::new(fake.clone(), Arc::new(FakeSurfaceAllocator));
    let options = options().stuck_timeout(Duration::from_millis(200));
    let codec = HCodec::create(FAKE_AVC_DECODER, ctx, options).unwrap();
    let _rx = listen(&codec);
    codec.configure(&video_format(640, 480)).unwrap();
    let component = fake.last_component().unwrap();
    component.freeze();
    assert_eq!(codec.start().unwrap_err(), CodecError::Unknown);
    // the pools are dropped right after the reply; any later round-trip waits for it
    codec.stop().unwrap();
    assert_eq!(component.registered_buffers(PortIndex::Input), 0);
    assert_eq!(component.registered_buffers(PortIndex::Output), 0);
}

fn expect_stuck_error(rx: &Receiver<Event>) {
    match next_event(rx) {
        Event::Error(ErrorType::Internal, CodecError::Unknown) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_stuck_stop_forces_loaded() {
    let fake = Arc::new(FakeComponentManager::new());
    let options = options().stuck_timeout(Duration::from_millis(200));
    let (codec, _rx, _inputs) = running_decoder_with(&fake, options);
    let component = fake.last_component().unwrap();
    component.freeze();

    codec.stop().unwrap();
    assert_eq!(component.registered_buffers(PortIndex::Input), 0);
    assert_eq!(component.registered_buffers(PortIndex::Output), 0);
    // stop keeps the component and restores the configuration
    assert_eq!(fake.live_instances(FAKE_AVC_DECODER), 1);
    let input = codec.input_format().unwrap();
    assert_eq!(input.get_int(keys::WIDTH), Some(1024));
}

#[test]
fn test_fatal_error_during_port_change_forces_shutdown() {
    let fake = Arc::new(FakeComponentManager::new());
    let options = options().stuck_timeout(Duration::from_millis(200));
    let (codec, rx, _inputs) = running_decoder_with(&fake, options);
    let component = fake.last_component().unwrap();
    component.freeze();
    component.trigger_port_settings_changed(1280, 720);
    assert!(matches!(next_event(&rx), Event::FormatChanged(_)));
    expect_stuck_error(&rx);

    codec.stop().unwrap();
    assert_eq!(fake.live_instances(FAKE_AVC_DECODER), 0);

    // a fresh component starts clean
    codec.reset().unwrap();
    codec.configure(&video_format(640, 480)).unwrap();
    codec.start().unwrap();
    assert_eq!(wait_inputs(&rx, 4).len(), 4);
}

#[test]
fn test_fatal_error_during_flush_forces_shutdown() {
    let fake = Arc::new(FakeComponentManager::new());
    let options = options()
        .stuck_timeout(Duration::from_millis(200))
        .sync_timeout(Duration::from_millis(1500));
    let (codec, rx, _inputs) = running_decoder_with(&fake, options);
    fake.last_component().unwrap().freeze();

    assert_eq!(codec.flush().unwrap_err(), CodecError::Unknown);
    expect_stuck_error(&rx);
    codec.stop().unwrap();
    assert_eq!(fake.live_instances(FAKE_AVC_DECODER), 0);
}

#[test]
fn test_port_change_during_flush_is_replayed() {
    let fake = Arc::new(FakeComponentManager::new());
    let (codec, rx, _inputs) = running_decoder(&fake);
    fake.last_component()
        .unwrap()
        .change_output_on_next_flush(1280, 720);

    codec.flush().unwrap();
    match next_event(&rx) {
        Event::FormatChanged(format) => {
            assert_eq!(format.get_int(keys::WIDTH), Some(1280));
            assert_eq!(format.get_int(keys::HEIGHT), Some(720));
        }
        other => panic!("unexpected {:?}", other),
    }
    codec.start().unwrap();
    let mut inputs = wait_inputs(&rx, 4);
    let output = codec.output_format().unwrap();
    assert_eq!(output.get_int(keys::WIDTH), Some(1280));

    let id = inputs.remove(0);
    queue_access_unit(&codec, id, 5);
    let (_, info, _) = wait_output(&rx, &mut inputs);
    assert_eq!(info.presentation_time_us, 5);
    assert_eq!(info.size, 1280 * 720 * 3 / 2);
}

#[test]
fn test_watchdog_of_an_old_state_is_ignored() {
    let fake = Arc::new(FakeComponentManager::new());
    let options = options().stuck_timeout(Duration::from_millis(500));
    let (codec, rx, inputs) = running_decoder_with(&fake, options);
    let component = fake.last_component().unwrap();
    component.freeze();
    component.trigger_port_settings_changed(1280, 720);
    assert!(matches!(next_event(&rx), Event::FormatChanged(_)));

    codec
        .msg_loop
        .handle()
        .send_async(Msg::CheckIfStuck(0), Duration::ZERO);
    // answered in place while the port change is pending
    codec.get_input_buffer(inputs[0]).unwrap();
    assert!(rx.try_recv().is_err());

    expect_stuck_error(&rx);
}

#[test]
fn test_render_to_display_surface() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_DECODER).unwrap();
    let rx = listen(&codec);
    let display = FakeSurface::display();
    codec.set_output_surface(display.clone()).unwrap();
    let format = video_format(640, 480).with_int(keys::ROTATION_ANGLE, 90);
    codec.configure(&format).unwrap();
    codec.start().unwrap();
    assert_eq!(display.transform(), TransformType::Rotate90);
    assert_eq!(display.queue_size(), 4);

    let mut inputs = wait_inputs(&rx, 4);
    queue_access_unit(&codec, inputs.remove(0), 42);
    let (out, _, _) = wait_output(&rx, &mut inputs);
    assert_eq!(
        codec.get_output_buffer(out).unwrap_err(),
        CodecError::InvalidOperation
    );
    codec.render_output_buffer(out).unwrap();
    assert_eq!(display.rendered(), vec![42]);

    // the slot comes back from the display and decodes again
    queue_access_unit(&codec, inputs.remove(0), 43);
    let (out, info, _) = wait_output(&rx, &mut inputs);
    assert_eq!(info.presentation_time_us, 43);
    codec.render_output_buffer(out).unwrap();
    assert_eq!(display.rendered(), vec![42, 43]);

    codec
        .set_parameters(&Format::new().with_int(keys::ROTATION_ANGLE, 45))
        .unwrap_err();
    codec
        .set_parameters(&Format::new().with_int(keys::ROTATION_ANGLE, 180))
        .unwrap();
    assert_eq!(display.transform(), TransformType::Rotate180);
}

#[test]
fn test_surface_direction_is_checked() {
    let fake = Arc::new(FakeComponentManager::new());
    let decoder = create(&fake, FAKE_AVC_DECODER).unwrap();
    let (consumer, producer) = FakeSurface::pair(false);
    assert_eq!(
        decoder.set_output_surface(consumer.clone()).unwrap_err(),
        CodecError::InvalidVal
    );
    assert_eq!(
        decoder.create_input_surface().err(),
        Some(CodecError::Unsupported)
    );
    assert_eq!(decoder.request_idr_frame().unwrap_err(), CodecError::InvalidState);

    let encoder = create(&fake, FAKE_AVC_ENCODER).unwrap();
    assert_eq!(
        encoder.set_input_surface(producer.clone()).unwrap_err(),
        CodecError::InvalidVal
    );
    assert_eq!(
        encoder.set_output_surface(producer).unwrap_err(),
        CodecError::Unsupported
    );
    encoder.set_input_surface(consumer).unwrap();
    assert_eq!(
        encoder.create_input_surface().err(),
        Some(CodecError::InvalidOperation)
    );
}

#[test]
fn test_encoder_configure_is_best_effort() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_ENCODER).unwrap();
    assert!(codec.is_encoder());
    // CQ without a quality is skipped, not rejected
    let format = video_format(640, 480)
        .with_int(keys::VIDEO_ENCODE_BITRATE_MODE, BitrateMode::Cq.raw())
        .with_int(keys::I_FRAME_INTERVAL, 1000);
    codec.configure(&format).unwrap();
    let component = fake.last_component().unwrap();
    assert!(!component.was_applied(ParamIndex::ConstantQuality));
    assert!(component.was_applied(ParamIndex::VideoAvc));
    assert!(component.was_applied(ParamIndex::ColorAspects));

    let input = codec.input_format().unwrap();
    assert_eq!(input.get_int(keys::PIXEL_FORMAT), Some(PixelFormat::Nv12.raw()));
}

#[test]
fn test_encoder_bitrate_modes() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_HEVC_ENCODER).unwrap();
    let format = video_format(1280, 720)
        .with_int(keys::VIDEO_ENCODE_BITRATE_MODE, BitrateMode::Cbr.raw())
        .with_long(keys::BITRATE, 4_000_000);
    codec.configure(&format).unwrap();
    let component = fake.last_component().unwrap();
    assert!(component.was_applied(ParamIndex::VideoBitrate));
    assert!(component.was_applied(ParamIndex::VideoHevc));
}

#[test]
fn test_encoder_idr_request() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_ENCODER).unwrap();
    let rx = listen(&codec);
    codec.configure(&video_format(320, 240)).unwrap();
    codec.start().unwrap();
    wait_inputs(&rx, 4);
    codec.request_idr_frame().unwrap();
    assert!(fake
        .last_component()
        .unwrap()
        .was_applied(ParamIndex::IntraRefreshVop));
    codec
        .set_parameters(&Format::new().with_int(keys::REQUEST_I_FRAME, 1))
        .unwrap();
    assert_eq!(codec.notify_eos().unwrap_err(), CodecError::InvalidOperation);
}

#[test]
fn test_encoder_reads_input_surface() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_ENCODER).unwrap();
    let rx = listen(&codec);
    let producer = codec.create_input_surface().unwrap();
    codec.configure(&video_format(64, 32)).unwrap();
    codec.start().unwrap();
    assert_eq!(codec.get_input_buffer(1).unwrap_err(), CodecError::InvalidOperation);

    // more frames than input slots: the rest wait in the surface
    const FRAMES: i64 = 6;
    producer.set_queue_size(8).unwrap();
    let request = BufferRequestConfig {
        width: 64,
        height: 32,
        stride_alignment: 32,
        format: GraphicPixelFormat::Ycbcr420Sp,
        ..Default::default()
    };
    for pts in 1..=FRAMES {
        let buffer = producer.request_buffer(&request).unwrap();
        let flush = BufferFlushConfig {
            timestamp: pts,
            ..Default::default()
        };
        producer.flush_buffer(&buffer, &flush).unwrap();
    }
    codec.notify_eos().unwrap();
    codec.notify_eos().unwrap();

    let mut encoded = Vec::new();
    loop {
        match next_event(&rx) {
            Event::Output(id, info, flag) => {
                if flag.contains(BufferFlag::EOS) {
                    break;
                }
                assert!(info.size > 0);
                encoded.push(info.presentation_time_us);
                codec.release_output_buffer(id).unwrap();
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(encoded, (1..=FRAMES).collect::<Vec<_>>());
}

fn queue_surface_frames(producer: &Arc<dyn Surface>, pts: impl IntoIterator<Item = i64>) {
    let request = BufferRequestConfig {
        width: 64,
        height: 32,
        stride_alignment: 32,
        format: GraphicPixelFormat::Ycbcr420Sp,
        ..Default::default()
    };
    for pts in pts {
        let buffer = producer.request_buffer(&request).unwrap();
        let flush = BufferFlushConfig {
            timestamp: pts,
            ..Default::default()
        };
        producer.flush_buffer(&buffer, &flush).unwrap();
    }
}

/// Timestamps of every encoded frame up to the end of stream.
fn encoded_until_eos(codec: &HCodec, rx: &Receiver<Event>) -> Vec<i64> {
    let mut encoded = Vec::new();
    loop {
        match next_event(rx) {
            Event::Output(id, info, flag) => {
                if flag.contains(BufferFlag::EOS) {
                    return encoded;
                }
                encoded.push(info.presentation_time_us);
                codec.release_output_buffer(id).unwrap();
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn test_surface_frames_queued_before_start_are_encoded() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_ENCODER).unwrap();
    let rx = listen(&codec);
    let producer = codec.create_input_surface().unwrap();
    codec.configure(&video_format(64, 32)).unwrap();
    queue_surface_frames(&producer, 1..=3);

    codec.start().unwrap();
    codec.notify_eos().unwrap();
    assert_eq!(encoded_until_eos(&codec, &rx), vec![1, 2, 3]);
}

#[test]
fn test_surface_frames_queued_while_stopped_are_encoded_after_restart() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_ENCODER).unwrap();
    let rx = listen(&codec);
    let producer = codec.create_input_surface().unwrap();
    codec.configure(&video_format(64, 32)).unwrap();
    codec.start().unwrap();
    codec.flush().unwrap();
    codec.stop().unwrap();
    queue_surface_frames(&producer, 1..=2);

    codec.start().unwrap();
    codec.notify_eos().unwrap();
    assert_eq!(encoded_until_eos(&codec, &rx), vec![1, 2]);
}

#[test]
fn test_flush_drops_surface_frames_waiting_for_start() {
    let fake = Arc::new(FakeComponentManager::new());
    let codec = create(&fake, FAKE_AVC_ENCODER).unwrap();
    let rx = listen(&codec);
    let producer = codec.create_input_surface().unwrap();
    codec.configure(&video_format(64, 32)).unwrap();
    codec.start().unwrap();
    codec.flush().unwrap();
    // buffers stop circulating until the next start
    queue_surface_frames(&producer, 1..=2);
    codec.flush().unwrap();

    // the dropped frames went back to the producer, so the queue has room
    queue_surface_frames(&producer, 3..=5);
    codec.start().unwrap();
    codec.notify_eos().unwrap();
    assert_eq!(encoded_until_eos(&codec, &rx), vec![3, 4, 5]);
}

#[test]
fn test_capabilities() {
    let fake = FakeComponentManager::new();
    let caps = HCodecList::capabilities(&fake).unwrap();
    assert_eq!(caps.len(), 4);

    let decoder = caps
        .iter()
        .find(|c| c.codec_name == FAKE_AVC_DECODER)
        .unwrap();
    assert_eq!(decoder.kind, CodecKind::VideoDecoder);
    assert_eq!(decoder.mime_type, "video/avc");
    assert!(decoder.bitrate_modes.is_empty());
    assert_eq!(
        decoder.pixel_formats,
        vec![PixelFormat::Nv12, PixelFormat::Yuvi420, PixelFormat::Rgba]
    );
    assert_eq!(decoder.profile_levels.len(), 3);
    assert_eq!(decoder.measured_frame_rate[&(3840, 2160)], Range { min: 15, max: 30 });
    assert_eq!(decoder.max_instances, FAKE_MAX_INSTANCES);

    let encoder = caps
        .iter()
        .find(|c| c.codec_name == FAKE_HEVC_ENCODER)
        .unwrap();
    assert_eq!(encoder.kind, CodecKind::VideoEncoder);
    assert_eq!(encoder.mime_type, "video/hevc");
    assert_eq!(
        encoder.bitrate_modes,
        vec![BitrateMode::Cbr, BitrateMode::Vbr, BitrateMode::Cq]
    );
    assert_eq!(encoder.profile_levels.len(), 2);
}
