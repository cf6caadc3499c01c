//! Pipeline builders for tests

use devlink::datatype::DatatypeKind;
use devlink::pipeline::{
    ColorCamera, EncoderProfile, ImageManip, NeuralNetwork, NodeHandle, Pipeline, VideoEncoder,
    XLinkIn, XLinkOut,
};

/// `XLinkIn(input)` linked straight to `XLinkOut(output)`
pub fn passthrough(input: &str, output: &str) -> Pipeline {
    let mut p = Pipeline::new();
    let xin = p.create(XLinkIn::new(input)).unwrap();
    let xout = p.create(XLinkOut::new(output)).unwrap();
    p.link(xin.out(), xout.input()).unwrap();
    p
}

/// Handles of the nodes in [`camera_nn`]
pub struct CameraNnGraph {
    pub pipeline: Pipeline,
    pub camera: NodeHandle<ColorCamera>,
    pub manip: NodeHandle<ImageManip>,
    pub nn: NodeHandle<NeuralNetwork>,
    pub preview_out: NodeHandle<XLinkOut>,
    pub nn_out: NodeHandle<XLinkOut>,
}

/// Camera preview → resize → network, with preview and detections streamed
/// to the host and a host stream driving the resize config.
pub fn camera_nn() -> CameraNnGraph {
    let mut p = Pipeline::new();
    let camera = p
        .create(ColorCamera::default().with_preview_size(416, 416))
        .unwrap();
    let manip = p.create(ImageManip::default()).unwrap();
    let nn = p.create(NeuralNetwork::new("models/detector.blob")).unwrap();
    let config_in = p
        .create(XLinkIn::new("manip_cfg").with_max_data_size(4096))
        .unwrap();
    let preview_out = p.create(XLinkOut::new("preview")).unwrap();
    let nn_out = p
        .create(XLinkOut::new("detections").with_datatype_filter(DatatypeKind::NNData))
        .unwrap();

    p.link(camera.preview(), manip.input_image()).unwrap();
    p.link(config_in.out(), manip.input_config()).unwrap();
    p.link(manip.out(), nn.input()).unwrap();
    p.link(camera.preview(), preview_out.input()).unwrap();
    p.link(nn.out(), nn_out.input()).unwrap();

    CameraNnGraph {
        pipeline: p,
        camera,
        manip,
        nn,
        preview_out,
        nn_out,
    }
}

/// Camera video → encoder → host
pub fn encoder_graph() -> Pipeline {
    let mut p = Pipeline::new();
    let camera = p.create(ColorCamera::default()).unwrap();
    let encoder = p
        .create(VideoEncoder::new(1920, 1080, 30.0, EncoderProfile::H264Main))
        .unwrap();
    let out = p.create(XLinkOut::new("h264")).unwrap();
    p.link(camera.video(), encoder.input()).unwrap();
    p.link(encoder.bitstream(), out.input()).unwrap();
    p
}
