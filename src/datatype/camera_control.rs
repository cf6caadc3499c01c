//! Camera command payload.

use super::{DatatypeKind, Message, Payload};
use serde::{Deserialize, Serialize};

/// Autofocus operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AutofocusMode {
    Off = 0,
    Auto = 1,
    Macro = 2,
    ContinuousVideo = 3,
    ContinuousPicture = 4,
    Edof = 5,
}

impl AutofocusMode {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => AutofocusMode::Off,
            1 => AutofocusMode::Auto,
            2 => AutofocusMode::Macro,
            3 => AutofocusMode::ContinuousVideo,
            4 => AutofocusMode::ContinuousPicture,
            5 => AutofocusMode::Edof,
            _ => return None,
        })
    }
}

/// A single camera command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraCommand {
    StartStream,
    StopStream,
    StillCapture,
    AutoFocusTrigger,
    AutoFocusMode(AutofocusMode),
    /// Lens position 0..=255.
    ManualFocus(u8),
    /// Exposure compensation in EV steps, -9..=9.
    ExposureCompensation(i8),
}

impl CameraCommand {
    fn tag(&self) -> u8 {
        match self {
            CameraCommand::StartStream => 1,
            CameraCommand::StopStream => 2,
            CameraCommand::StillCapture => 3,
            CameraCommand::AutoFocusTrigger => 4,
            CameraCommand::AutoFocusMode(_) => 5,
            CameraCommand::ManualFocus(_) => 6,
            CameraCommand::ExposureCompensation(_) => 7,
        }
    }

    fn same_slot(&self, other: &CameraCommand) -> bool {
        self.tag() == other.tag()
    }
}

/// Batch of camera commands sent to a camera node's control input.
///
/// Setting the same command twice replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraControl {
    pub commands: Vec<CameraCommand>,
}

impl CameraControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, cmd: CameraCommand) -> &mut Self {
        match self.commands.iter_mut().find(|c| c.same_slot(&cmd)) {
            Some(existing) => *existing = cmd,
            None => self.commands.push(cmd),
        }
        self
    }

    fn clear(&mut self, tag: u8) -> &mut Self {
        self.commands.retain(|c| c.tag() != tag);
        self
    }

    pub fn set_start_streaming(&mut self) -> &mut Self {
        self.clear(CameraCommand::StopStream.tag());
        self.set(CameraCommand::StartStream)
    }

    pub fn set_stop_streaming(&mut self) -> &mut Self {
        self.clear(CameraCommand::StartStream.tag());
        self.set(CameraCommand::StopStream)
    }

    pub fn set_capture_still(&mut self, capture: bool) -> &mut Self {
        if capture {
            self.set(CameraCommand::StillCapture)
        } else {
            self.clear(CameraCommand::StillCapture.tag())
        }
    }

    pub fn set_auto_focus_trigger(&mut self) -> &mut Self {
        self.set(CameraCommand::AutoFocusTrigger)
    }

    pub fn set_auto_focus_mode(&mut self, mode: AutofocusMode) -> &mut Self {
        self.set(CameraCommand::AutoFocusMode(mode))
    }

    pub fn set_manual_focus(&mut self, lens_position: u8) -> &mut Self {
        self.set(CameraCommand::ManualFocus(lens_position))
    }

    pub fn set_auto_exposure_compensation(&mut self, ev: i8) -> &mut Self {
        self.set(CameraCommand::ExposureCompensation(ev.clamp(-9, 9)))
    }

    pub fn contains(&self, cmd: &CameraCommand) -> bool {
        self.commands.iter().any(|c| c == cmd)
    }
}

impl Payload for CameraControl {
    const KIND: DatatypeKind = DatatypeKind::CameraControl;

    fn from_message(msg: Message) -> Option<Self> {
        match msg {
            Message::CameraControl(c) => Some(c),
            _ => None,
        }
    }

    fn peek(msg: &Message) -> Option<&Self> {
        match msg {
            Message::CameraControl(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut ctrl = CameraControl::new();
        ctrl.set_auto_focus_mode(AutofocusMode::ContinuousVideo)
            .set_manual_focus(120)
            .set_auto_exposure_compensation(-3)
            .set_capture_still(true);
        let decoded = CameraControl::decode(&ctrl.encode().unwrap()).unwrap();
        assert_eq!(decoded, ctrl);
    }

    #[test]
    fn test_set_replaces_same_command() {
        let mut ctrl = CameraControl::new();
        ctrl.set_manual_focus(10).set_manual_focus(20);
        assert_eq!(ctrl.commands, vec![CameraCommand::ManualFocus(20)]);
    }

    #[test]
    fn test_start_stop_are_exclusive() {
        let mut ctrl = CameraControl::new();
        ctrl.set_start_streaming().set_stop_streaming();
        assert!(ctrl.contains(&CameraCommand::StopStream));
        assert!(!ctrl.contains(&CameraCommand::StartStream));
    }

    #[test]
    fn test_exposure_clamped() {
        let mut ctrl = CameraControl::new();
        ctrl.set_auto_exposure_compensation(100);
        assert!(ctrl.contains(&CameraCommand::ExposureCompensation(9)));
    }

    #[test]
    fn test_unknown_command_rejected() {
        // one command with variant index 42
        let bytes = [1u8, 42];
        assert!(CameraControl::decode(&bytes).is_err());
    }

    #[test]
    fn test_command_body_layout() {
        let mut ctrl = CameraControl::new();
        ctrl.set_auto_focus_mode(AutofocusMode::Macro);
        // count, command variant, mode variant
        assert_eq!(ctrl.encode().unwrap(), vec![1, 4, 2]);
    }
}
