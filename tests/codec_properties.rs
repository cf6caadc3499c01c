//! Property tests for the stream packet codec

use devlink::datatype::{
    AutofocusMode, Buffer, CameraControl, FrameType, ImageManipConfig, ImgFrame, NNData,
    TensorDataType,
};
use devlink::queue::{StreamPacket, HEADER_LEN};
use devlink::{DatatypeKind, Message};
use proptest::prelude::*;
use std::time::Duration;

fn frame_type() -> impl Strategy<Value = FrameType> {
    (0u8..=8).prop_map(|v| FrameType::from_u8(v).unwrap())
}

fn message() -> impl Strategy<Value = Message> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..256).prop_map(|d| Message::from(Buffer::new(d))),
        (1u32..64, 1u32..64, frame_type(), any::<u64>(), prop::collection::vec(any::<u8>(), 0..128))
            .prop_map(|(w, h, t, seq, data)| {
                Message::from(ImgFrame::new(w, h, t).with_sequence_num(seq).with_data(data))
            }),
        prop::collection::vec(any::<f32>().prop_filter("finite", |f| f.is_finite()), 1..16)
            .prop_map(|values| {
                let mut nn = NNData::new();
                let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                nn.add_layer("out", TensorDataType::Fp32, vec![values.len() as u32], bytes);
                Message::from(nn)
            }),
        (1i32..2000, 1i32..2000, any::<bool>()).prop_map(|(w, h, flip)| {
            let mut cfg = ImageManipConfig::new();
            cfg.set_resize(w, h).set_horizontal_flip(flip);
            Message::from(cfg)
        }),
        (0u8..=5, any::<u8>()).prop_map(|(mode, lens)| {
            let mut ctrl = CameraControl::new();
            ctrl.set_auto_focus_mode(AutofocusMode::from_u8(mode).unwrap())
                .set_manual_focus(lens);
            Message::from(ctrl)
        }),
    ]
}

proptest! {
    #[test]
    fn packet_round_trip(msg in message(), micros in 0u64..(1 << 40)) {
        let ts = Duration::from_micros(micros);
        let bytes = StreamPacket::serialize(&msg, ts).unwrap();
        prop_assert_eq!(StreamPacket::peek_kind(&bytes).unwrap(), msg.kind());

        let packet = StreamPacket::parse(&bytes).unwrap();
        prop_assert_eq!(packet.timestamp, ts);
        prop_assert_eq!(packet.message, msg);
    }

    #[test]
    fn truncated_packets_are_rejected(msg in message(), cut in 1usize..64) {
        let bytes = StreamPacket::serialize(&msg, Duration::ZERO).unwrap();
        let keep = bytes.len().saturating_sub(cut);
        prop_assert!(StreamPacket::parse(&bytes[..keep]).is_err());
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..96)) {
        let _ = StreamPacket::parse(&bytes);
    }
}

#[test]
fn test_header_is_fixed_size() {
    let bytes = StreamPacket::serialize(&Message::from(Buffer::new(vec![0; 12])), Duration::ZERO)
        .unwrap();
    // one varint length byte ahead of the data
    assert_eq!(bytes.len(), HEADER_LEN + 1 + 12);
    assert_eq!(StreamPacket::peek_kind(&bytes).unwrap(), DatatypeKind::Buffer);
}
