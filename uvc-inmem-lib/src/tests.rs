use crate::channel::{ChannelConfig, ChannelConsumer, StreamChannel, Wait};
use crate::config::StreamConfig;
use crate::constants::*;
use crate::depacketize::FrameAssembler;
use crate::error::UvcError;
use crate::frame_table::FrameTable;
use crate::header::UvcHeader;
use crate::probe::{DEFAULT_PROBE_CONTROL, ProbeControl};
use crate::setup::{Recipient, RequestKind, SetupPacket, UvcRequest};
use crate::streaming::{Segment, Segmenter, StreamCursor, buffers_per_frame};
use crate::transport::UsbSpeed;
use bytes::Bytes;
use num_enum::FromPrimitive;
use std::time::Duration;

fn pool(buffer_size: usize, buffer_count: usize) -> (StreamChannel, ChannelConsumer) {
    let (channel, consumer) = StreamChannel::create(ChannelConfig {
        buffer_size,
        buffer_count,
        header_size: UVC_HEADER_SIZE,
    })
    .expect("Failed to create channel");
    channel.set_transfer(0).expect("Failed to start transfer");
    (channel, consumer)
}

/// Runs the segmenter for `count` buffers, returning each segment with the
/// bytes the consumer received.
async fn segment(frames: &FrameTable, segmenter: &mut Segmenter, count: usize) -> Vec<(Segment, Vec<u8>)> {
    segment_sized(frames, segmenter, STREAM_BUF_SIZE, count).await
}

async fn segment_sized(
    frames: &FrameTable,
    segmenter: &mut Segmenter,
    buffer_size: usize,
    count: usize,
) -> Vec<(Segment, Vec<u8>)> {
    let (channel, mut consumer) = pool(buffer_size, 2);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let mut buffer = channel.acquire(Wait::Forever).await.expect("Failed to acquire");
        let seg = segmenter.fill(frames, &mut buffer).expect("Failed to fill");
        channel.commit(buffer, seg.commit_len).expect("Failed to commit");
        let committed = consumer.try_next().expect("Nothing committed");
        out.push((seg, committed.bytes().to_vec()));
        consumer.release(committed);
        segmenter.advance(frames, &seg);
    }
    out
}

fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

#[test]
fn test_setup_packet_from_words() {
    // GET_CUR, VS probe control, interface 1, 26 bytes
    let setup = SetupPacket::from_words(0x0100_81A1, 0x001A_0001);

    assert_eq!(setup.kind(), RequestKind::Class);
    assert_eq!(setup.recipient(), Recipient::Interface);
    assert!(setup.request_type.device_to_host());
    assert_eq!(UvcRequest::from_primitive(setup.request), UvcRequest::GetCur);
    assert_eq!(setup.value, VS_PROBE_CONTROL);
    assert_eq!(setup.control_selector(), 0x01);
    assert_eq!(setup.index_low(), UVC_INTERFACE_VS);
    assert_eq!(setup.index_high(), 0);
    assert_eq!(setup.length, 26);
    assert_eq!(hex::encode(setup.to_bytes()), "a181000101001a00");
}

#[test]
fn test_setup_packet_from_slice() {
    let bytes = hex::decode("2101000201002200").unwrap();
    let setup = SetupPacket::try_from(bytes.as_slice()).unwrap();

    assert!(!setup.request_type.device_to_host());
    assert_eq!(UvcRequest::from_primitive(setup.request), UvcRequest::SetCur);
    assert_eq!(setup.value, VS_COMMIT_CONTROL);
    assert_eq!(setup.length, PROBE_CONTROL_SIZE as u16);

    let short = SetupPacket::try_from(&bytes[..5]);
    assert!(matches!(
        short,
        Err(UvcError::InsufficientData { expected: 8, actual: 5 })
    ));
}

#[test]
fn test_setup_packet_standard_kinds() {
    // CLEAR_FEATURE to interface 0
    let setup = SetupPacket::new(0x01, 0x01, 0, 0, 0);
    assert_eq!(setup.kind(), RequestKind::Standard);
    assert_eq!(setup.recipient(), Recipient::Interface);

    let vendor = SetupPacket::new(0xC0, 0x10, 0, 0, 4);
    assert_eq!(vendor.kind(), RequestKind::Vendor);
    assert_eq!(vendor.recipient(), Recipient::Device);
}

#[test]
fn test_header_bytes() {
    let header = UvcHeader::build(false, false);
    assert_eq!(hex::encode(header.to_bytes()), "0c8c00000000000000000000");

    let header = UvcHeader::build(true, false);
    assert_eq!(header.to_bytes()[1], 0x8E);

    let header = UvcHeader::build(false, true);
    assert_eq!(header.to_bytes()[1], 0x8D);

    let header = UvcHeader::build(true, true);
    assert_eq!(header.to_bytes()[1], 0x8F);
    assert!(header.is_end_of_frame());
    assert!(header.frame_id());
}

#[test]
fn test_header_write_to_short_buffer() {
    let mut short = [0u8; UVC_HEADER_SIZE - 1];
    assert!(matches!(
        UvcHeader::build(false, false).write_to(&mut short),
        Err(UvcError::InsufficientData {
            expected: UVC_HEADER_SIZE,
            actual: 11
        })
    ));
    assert_eq!(short, [0u8; UVC_HEADER_SIZE - 1]);
}

#[test]
fn test_header_parse() {
    let mut transfer = vec![0u8; 20];
    UvcHeader::build(true, true).write_to(&mut transfer).unwrap();

    let (header, len) = UvcHeader::parse(&transfer).unwrap();
    assert_eq!(len, UVC_HEADER_SIZE);
    assert!(header.is_end_of_frame());
    assert!(header.frame_id());
    assert!(header.info.end_of_header());
    assert!(header.info.presentation_time());
    assert!(header.info.source_clock());
    assert!(!header.info.error());

    assert!(matches!(
        UvcHeader::parse(&transfer[..4]),
        Err(UvcError::InsufficientData { expected: 12, actual: 4 })
    ));

    transfer[0] = 40;
    assert!(matches!(UvcHeader::parse(&transfer), Err(UvcError::InvalidHeader(_))));
}

#[test]
fn test_probe_control_layout() {
    assert_eq!(std::mem::size_of::<ProbeControl>(), PROBE_CONTROL_SIZE);

    let bytes = DEFAULT_PROBE_CONTROL.to_bytes();
    assert_eq!(&bytes[0..2], &[0, 0]);
    assert_eq!(bytes[2], 1, "format index");
    assert_eq!(bytes[3], 1, "frame index");
    assert_eq!(&bytes[4..8], &[0x15, 0x16, 0x05, 0x00], "333333 x 100ns");
    assert_eq!(&bytes[18..22], &[0x00, 0x60, 0x09, 0x00], "640*480*2");
    assert_eq!(&bytes[22..26], &[0x00, 0x10, 0x00, 0x00], "4096");
    assert!(bytes[26..].iter().all(|&b| b == 0));

    assert!((DEFAULT_PROBE_CONTROL.frames_per_second() - 30.0).abs() < 0.01);
}

#[test]
fn test_probe_control_parse() {
    let mut block = vec![0u8; 48];
    block[..PROBE_CONTROL_SIZE].copy_from_slice(&DEFAULT_PROBE_CONTROL.to_bytes());
    block[3] = 2;

    let parsed = ProbeControl::parse(&block).unwrap();
    assert_eq!(parsed.frame_index, 2);
    assert_eq!(parsed.frame_interval.get(), 333_333);

    assert!(ProbeControl::parse(&block[..26]).is_err());
}

#[test]
fn test_frame_table_from_lengths() {
    let blob = Bytes::from(patterned(150, 0));
    let table = FrameTable::from_lengths(blob.clone(), &[100, 50]).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.total_bytes(), 150);
    assert_eq!(table.entry(1).unwrap().start_offset, 100);
    assert_eq!(table.frame(1), &blob[100..150]);
    assert_eq!(table.frame_len(7), 0);

    assert!(matches!(
        FrameTable::from_lengths(blob.clone(), &[100, 51]),
        Err(UvcError::InvalidFrameTable(_))
    ));
    assert!(matches!(
        FrameTable::from_lengths(blob.clone(), &[]),
        Err(UvcError::InvalidFrameTable(_))
    ));
    assert!(matches!(
        FrameTable::from_lengths(blob, &[150]),
        Err(UvcError::InvalidFrameTable(_))
    ));
}

#[test]
fn test_frame_table_slice_and_wrap() {
    let table = FrameTable::from_frames([patterned(10, 0), patterned(5, 100)]).unwrap();

    assert_eq!(table.slice(0, 8, 100), &[8, 9]);
    assert_eq!(table.slice(0, 12, 4), &[] as &[u8]);
    assert_eq!(table.slice(1, 0, 2), &[100, 101]);
    assert_eq!(table.slice(2, 0, 2), &[] as &[u8]);

    assert_eq!(table.next_index(0), 1);
    assert_eq!(table.next_index(1), 0);
}

#[test]
fn test_frame_table_from_dir() {
    let dir = std::env::temp_dir().join(format!("uvc-inmem-frames-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("frame_001.jpg"), patterned(30, 1)).unwrap();
    std::fs::write(dir.join("frame_000.jpg"), patterned(20, 0)).unwrap();

    let table = FrameTable::from_dir(&dir).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.frame_len(0), 20);
    assert_eq!(table.frame_len(1), 30);
}

#[test]
fn test_buffers_per_frame() {
    assert_eq!(buffers_per_frame(9000, 4096, 12), 3);
    assert_eq!(buffers_per_frame(8168, 4096, 12), 3);
    assert_eq!(buffers_per_frame(100, 4096, 12), 1);
    assert_eq!(buffers_per_frame(0, 4096, 12), 1);
}

#[tokio::test]
async fn test_segmentation_two_frames() {
    let big = patterned(9000, 0);
    let small = patterned(100, 7);
    let frames = FrameTable::from_frames([big.clone(), small.clone()]).unwrap();
    let mut segmenter = Segmenter::new();

    let out = segment(&frames, &mut segmenter, 4).await;
    let lengths: Vec<usize> = out.iter().map(|(s, _)| s.commit_len).collect();
    assert_eq!(lengths, vec![4096, 4096, 844, 112]);

    let flags: Vec<(bool, bool)> = out.iter().map(|(s, _)| (s.end_of_frame, s.frame_id)).collect();
    assert_eq!(flags, vec![(false, false), (false, false), (true, false), (true, true)]);

    // Headers match the segment flags and the payload rebuilds the frames
    let infos: Vec<u8> = out.iter().map(|(_, bytes)| bytes[1]).collect();
    assert_eq!(infos, vec![0x8C, 0x8C, 0x8E, 0x8F]);

    let rebuilt: Vec<u8> = out[..3].iter().flat_map(|(_, b)| b[UVC_HEADER_SIZE..].to_vec()).collect();
    assert_eq!(rebuilt, big);
    assert_eq!(&out[3].1[UVC_HEADER_SIZE..], small.as_slice());

    // Wrapped back to frame 0 with FID clear again
    assert_eq!(segmenter.cursor().frame_index, 0);
    assert_eq!(segmenter.cursor().frame_offset, 0);
    assert!(!segmenter.frame_id());
}

#[tokio::test]
async fn test_segmentation_any_frame_length() {
    for buffer_size in [13, 14, 64, 100] {
        let payload = buffer_size - UVC_HEADER_SIZE;
        for len in 0..300 {
            let frame = patterned(len, len as u8);
            let frames = FrameTable::from_frames([frame.clone(), patterned(3, 0xEE)]).unwrap();
            let mut segmenter = Segmenter::new();

            let count = len / payload + 1;
            assert_eq!(buffers_per_frame(len, buffer_size, UVC_HEADER_SIZE), count);
            let out = segment_sized(&frames, &mut segmenter, buffer_size, count).await;

            let (last, body) = out.split_last().unwrap();
            assert!(last.0.end_of_frame, "C={} L={}", buffer_size, len);
            assert!(last.0.commit_len < buffer_size, "C={} L={}", buffer_size, len);
            for (seg, bytes) in body {
                assert!(!seg.end_of_frame, "C={} L={}", buffer_size, len);
                assert_eq!(seg.commit_len, buffer_size);
                assert_eq!(bytes.len(), buffer_size);
            }

            let rebuilt: Vec<u8> = out.iter().flat_map(|(_, b)| b[UVC_HEADER_SIZE..].to_vec()).collect();
            assert_eq!(rebuilt, frame, "C={} L={}", buffer_size, len);
            assert!(out.iter().all(|(s, _)| s.frame_index == 0 && !s.frame_id));

            // On to the next frame with the FID flipped
            assert_eq!(segmenter.cursor().frame_index, 1);
            assert_eq!(segmenter.cursor().frame_offset, 0);
            assert!(segmenter.frame_id());
        }
    }
}

#[tokio::test]
async fn test_segmenter_rejects_short_header_area() {
    let frames = FrameTable::from_frames([patterned(10, 0), patterned(10, 1)]).unwrap();
    let (channel, _consumer) = StreamChannel::create(ChannelConfig {
        buffer_size: 64,
        buffer_count: 1,
        header_size: 4,
    })
    .unwrap();
    channel.set_transfer(0).unwrap();

    let mut buffer = channel.acquire(Wait::Forever).await.unwrap();
    let result = Segmenter::new().fill(&frames, &mut buffer);
    assert!(matches!(result, Err(UvcError::InsufficientData { actual: 4, .. })));
}

#[tokio::test]
async fn test_segmentation_exact_multiple() {
    let payload = STREAM_BUF_SIZE - UVC_HEADER_SIZE;
    let frames = FrameTable::from_frames([patterned(payload * 2, 3), patterned(10, 0)]).unwrap();
    let mut segmenter = Segmenter::new();

    let out = segment(&frames, &mut segmenter, 3).await;
    let lengths: Vec<usize> = out.iter().map(|(s, _)| s.commit_len).collect();
    assert_eq!(lengths, vec![STREAM_BUF_SIZE, STREAM_BUF_SIZE, UVC_HEADER_SIZE]);
    assert!(!out[1].0.end_of_frame);
    assert!(out[2].0.end_of_frame);
    assert_eq!(out[2].0.payload_len, 0);
}

#[tokio::test]
async fn test_segmentation_frame_id_alternates() {
    let frames = FrameTable::from_frames([patterned(10, 0), patterned(10, 50)]).unwrap();
    let mut segmenter = Segmenter::new();

    let out = segment(&frames, &mut segmenter, 5).await;
    let fids: Vec<bool> = out.iter().map(|(s, _)| s.frame_id).collect();
    assert_eq!(fids, vec![false, true, false, true, false]);
    assert!(out.iter().all(|(s, _)| s.end_of_frame && s.commit_len == 22));
}

#[tokio::test]
async fn test_segmenter_reset() {
    let frames = FrameTable::from_frames([patterned(9000, 0), patterned(10, 0)]).unwrap();
    let mut segmenter = Segmenter::new();

    segment(&frames, &mut segmenter, 4).await;
    segment(&frames, &mut segmenter, 1).await;
    assert_eq!(segmenter.cursor().frame_offset, STREAM_BUF_SIZE - UVC_HEADER_SIZE);

    segmenter.reset();
    assert_eq!(segmenter.cursor(), StreamCursor::default());
    assert!(!segmenter.frame_id());
}

#[tokio::test]
async fn test_frame_assembler() {
    let frames = FrameTable::from_frames([patterned(9000, 0), patterned(100, 9)]).unwrap();
    let mut segmenter = Segmenter::new();
    let out = segment(&frames, &mut segmenter, 4).await;

    let mut assembler = FrameAssembler::new();
    let mut assembled = Vec::new();
    for (_, transfer) in &out {
        if let Some(frame) = assembler.push(transfer).unwrap() {
            assembled.push(frame);
        }
    }

    assert_eq!(assembled.len(), 2);
    assert_eq!(assembled[0].data.as_ref(), frames.frame(0));
    assert_eq!(assembled[0].transfers, 3);
    assert!(!assembled[0].frame_id);
    assert_eq!(assembled[1].data.as_ref(), frames.frame(1));
    assert!(assembled[1].frame_id);
    assert_eq!(assembler.dropped_frames(), 0);
    assert_eq!(assembler.last_frame_id(), Some(true));
}

#[test]
fn test_frame_assembler_drops_partial_on_fid_flip() {
    let mut mid = vec![0u8; 20];
    UvcHeader::build(false, false).write_to(&mut mid).unwrap();
    let mut eof = vec![0xAAu8; 16];
    UvcHeader::build(true, true).write_to(&mut eof).unwrap();

    let mut assembler = FrameAssembler::new();
    assert!(assembler.push(&mid).unwrap().is_none());
    let frame = assembler.push(&eof).unwrap().unwrap();

    assert_eq!(assembler.dropped_frames(), 1);
    assert_eq!(frame.data.as_ref(), &[0xAA; 4]);
    assert_eq!(frame.transfers, 1);
}

#[tokio::test(start_paused = true)]
async fn test_channel_acquire_timeout() {
    let (channel, _consumer) = pool(64, 1);
    let _held = channel.acquire(Wait::Forever).await.unwrap();

    let result = channel.acquire(Wait::Timeout(Duration::from_millis(10))).await;
    assert!(matches!(result, Err(UvcError::Timeout(_))));
}

#[tokio::test(start_paused = true)]
async fn test_channel_destroy_wakes_acquire() {
    let (channel, mut consumer) = pool(64, 1);
    let _held = channel.acquire(Wait::Forever).await.unwrap();

    let (result, ()) = tokio::join!(channel.acquire(Wait::Forever), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        channel.destroy();
    });

    assert!(matches!(result, Err(UvcError::ChannelClosed)));
    assert!(channel.is_closed());
    assert!(consumer.next().await.is_none());
}

#[tokio::test]
async fn test_channel_commit_checks() {
    let (channel, _consumer) = StreamChannel::create(ChannelConfig {
        buffer_size: 64,
        buffer_count: 2,
        header_size: UVC_HEADER_SIZE,
    })
    .unwrap();

    let buffer = channel.acquire(Wait::Forever).await.unwrap();
    assert_eq!(buffer.payload_capacity(), 64 - UVC_HEADER_SIZE);
    assert!(matches!(channel.commit(buffer, 12), Err(UvcError::NotTransferring)));

    assert!(matches!(channel.set_transfer(5), Err(UvcError::InvalidConfig(_))));
    channel.set_transfer(0).unwrap();

    let buffer = channel.acquire(Wait::Forever).await.unwrap();
    assert!(matches!(
        channel.commit(buffer, 65),
        Err(UvcError::CommitTooLarge { length: 65, capacity: 64 })
    ));

    channel.destroy();
    assert!(matches!(channel.set_transfer(0), Err(UvcError::ChannelClosed)));
}

#[test]
fn test_channel_generations_differ() {
    let (a, consumer_a) = pool(64, 1);
    let (b, _) = pool(64, 1);
    assert_ne!(a.generation(), b.generation());
    assert_eq!(a.generation(), consumer_a.generation());
}

#[test]
fn test_channel_rejects_bad_geometry() {
    let result = StreamChannel::create(ChannelConfig {
        buffer_size: 12,
        buffer_count: 4,
        header_size: UVC_HEADER_SIZE,
    });
    assert!(matches!(result, Err(UvcError::InvalidConfig(_))));

    let result = StreamChannel::create(ChannelConfig {
        buffer_size: 4096,
        buffer_count: 0,
        header_size: UVC_HEADER_SIZE,
    });
    assert!(matches!(result, Err(UvcError::InvalidConfig(_))));
}

#[test]
fn test_stream_config_defaults() {
    let config = StreamConfig::default();
    assert_eq!(config.video_endpoint, 0x81);
    assert_eq!(config.status_endpoint, 0x82);
    assert_eq!(config.packet_size, 1024);
    assert_eq!(config.buffer_size, 4096);
    assert_eq!(config.buffer_count, 10);
    assert_eq!(config.burst_for(UsbSpeed::Super), 8);
    assert_eq!(config.burst_for(UsbSpeed::High), 1);
    assert_eq!(config.burst_for(UsbSpeed::Full), 1);
    assert_eq!(config.acquire_wait(), Wait::Forever);
    assert_eq!(config.idle_interval(), Duration::from_millis(100));
    config.validate().unwrap();
}

#[test]
fn test_stream_config_from_json() {
    let config = StreamConfig::from_json_str(r#"{"buffer_count": 4, "acquire_timeout_ms": 50}"#).unwrap();
    assert_eq!(config.buffer_count, 4);
    assert_eq!(config.buffer_size, STREAM_BUF_SIZE);
    assert_eq!(config.acquire_wait(), Wait::Timeout(Duration::from_millis(50)));

    let channel = config.channel_config();
    assert_eq!(channel.buffer_count, 4);
    assert_eq!(channel.header_size, UVC_HEADER_SIZE);

    assert!(matches!(
        StreamConfig::from_json_str(r#"{"buffers": 4}"#),
        Err(UvcError::Config(_))
    ));
    assert!(matches!(
        StreamConfig::from_json_str(r#"{"video_endpoint": 1}"#),
        Err(UvcError::InvalidConfig(_))
    ));
    assert!(matches!(
        StreamConfig::from_json_str(r#"{"buffer_size": 12}"#),
        Err(UvcError::InvalidConfig(_))
    ));
    assert!(matches!(
        StreamConfig::from_json_str(r#"{"super_speed_burst": 17}"#),
        Err(UvcError::InvalidConfig(_))
    ));
}
