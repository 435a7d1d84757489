//! Panel controls on the extended firmware
//!
//! Turns successive packets into change events: button edges and pot moves.
//! Pots are noisy, so a move only counts once it leaves a small deadband
//! around the last reported value.

use crate::packet::{Button, Buttons, EncoderPacket};

/// Pot change (0.0 - 1.0 scale) below which no event is sent
pub const POT_DEADBAND: f64 = 0.01;

/// Change on the control panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelEvent {
    ButtonPressed(Button),
    ButtonReleased(Button),
    /// Volume pot moved (0.0 - 1.0)
    Volume(f64),
    /// Slider pot moved (0.0 - 1.0)
    Slider(f64),
}

/// Tracks panel state between packets
#[derive(Debug, Clone, Default)]
pub struct PanelTracker {
    buttons: Buttons,
    volume: Option<f64>,
    slider: Option<f64>,
}

impl PanelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events caused by this packet; basic packets never produce any
    pub fn update(&mut self, packet: &EncoderPacket) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        if packet.extended.is_none() {
            return events;
        }

        let buttons = packet.buttons();
        for button in Button::ALL {
            match (self.buttons.is_pressed(button), buttons.is_pressed(button)) {
                (false, true) => events.push(PanelEvent::ButtonPressed(button)),
                (true, false) => events.push(PanelEvent::ButtonReleased(button)),
                _ => {}
            }
        }
        self.buttons = buttons;

        if let Some(volume) = packet.volume() {
            if moved(&mut self.volume, volume) {
                events.push(PanelEvent::Volume(volume));
            }
        }
        if let Some(slider) = packet.slider() {
            if moved(&mut self.slider, slider) {
                events.push(PanelEvent::Slider(slider));
            }
        }

        events
    }
}

/// Record `value` if it left the deadband around the last reported one
fn moved(last: &mut Option<f64>, value: f64) -> bool {
    match *last {
        Some(prev) if (value - prev).abs() < POT_DEADBAND => false,
        _ => {
            *last = Some(value);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{EncoderReading, ExtendedInputs};

    fn packet(buttons: u8, volume_pot: u16, slider_pot: u16) -> EncoderPacket {
        let reading = EncoderReading {
            position: 0,
            velocity_fixed: 0,
        };
        EncoderPacket {
            primary: reading,
            timestamp_ms: 0,
            extended: Some(ExtendedInputs {
                secondary: reading,
                buttons: Buttons(buttons),
                volume_pot,
                slider_pot,
            }),
        }
    }

    #[test]
    fn test_first_packet_reports_pots() {
        let mut tracker = PanelTracker::new();
        let events = tracker.update(&packet(0, 4095, 0));
        assert_eq!(events, vec![PanelEvent::Volume(1.0), PanelEvent::Slider(0.0)]);
        assert!(tracker.update(&packet(0, 4095, 0)).is_empty());
    }

    #[test]
    fn test_button_edges() {
        let mut tracker = PanelTracker::new();
        tracker.update(&packet(0, 0, 0));

        let events = tracker.update(&packet(Button::Song2.mask(), 0, 0));
        assert_eq!(events, vec![PanelEvent::ButtonPressed(Button::Song2)]);
        // Held: no repeat
        assert!(tracker.update(&packet(Button::Song2.mask(), 0, 0)).is_empty());

        let events = tracker.update(&packet(Button::Sfx3.mask(), 0, 0));
        assert_eq!(
            events,
            vec![
                PanelEvent::ButtonPressed(Button::Sfx3),
                PanelEvent::ButtonReleased(Button::Song2),
            ]
        );
    }

    #[test]
    fn test_pot_deadband() {
        let mut tracker = PanelTracker::new();
        tracker.update(&packet(0, 2048, 0));
        // ~0.005 change: jitter
        assert!(tracker.update(&packet(0, 2068, 0)).is_empty());
        // ~0.012 from the last report
        let events = tracker.update(&packet(0, 2098, 0));
        assert!(matches!(events.as_slice(), [PanelEvent::Volume(_)]));
    }

    #[test]
    fn test_basic_packet_is_ignored() {
        let mut tracker = PanelTracker::new();
        let basic = EncoderPacket {
            extended: None,
            ..packet(0, 0, 0)
        };
        assert!(tracker.update(&basic).is_empty());
    }
}
