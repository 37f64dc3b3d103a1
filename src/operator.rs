//! Text menus for the operator, with bounded retries on invalid input.

use crate::channel::{ChannelConfig, ChannelId};
use crate::config::ConfigError;
use derive_try_from_primitive::TryFromPrimitive;
use std::convert::TryFrom;
use std::io::{BufRead, Write};
use std::ops::RangeInclusive;

#[repr(u8)]
#[derive(TryFromPrimitive, Copy, Clone, Debug, Eq, PartialEq)]
pub enum MenuChoice {
    TurnOff = 0,
    TurnOn = 1,
    Blink = 2,
    BlinkAll = 3,
    Plot = 4,
    Exit = 5,
}

/// Reads answers from `input` and writes questions to `output`.
///
/// Every question is asked at most `max_attempts` times; an invalid answer prints a notice
/// and asks again.
pub struct Prompt<R, W> {
    input: R,
    output: W,
    max_attempts: usize,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W, max_attempts: usize) -> Self {
        Self {
            input,
            output,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub fn say(&mut self, text: &str) -> Result<(), ConfigError> {
        writeln!(self.output, "{}", text).map_err(ConfigError::Input)
    }

    pub fn main_menu(&mut self) -> Result<MenuChoice, ConfigError> {
        let menu = "\n===== LED STUDENT DEVICE =====\n\n\
                    [0] Turn off all LEDs\n\
                    [1] Turn on all LEDs\n\
                    [2] Blink LED\n\
                    [3] Blink all LEDs\n\
                    [4] Plot waveforms\n\
                    [5] Exit\n\nYour Selection: ";

        self.ask(menu, choice)
    }

    pub fn channel(&mut self) -> Result<ChannelId, ConfigError> {
        let question = "\nSelect LED to blink.\n\n[0] Green LED\n[1] Red LED\n\nYour Selection: ";

        self.ask(question, choice)
    }

    /// Asks for frequency, duty cycle and brightness of one channel.
    pub fn channel_config(&mut self, channel: ChannelId) -> Result<ChannelConfig, ConfigError> {
        let question = format!(
            "\nEnter frequency to blink {} LED.\n\
             Enter whole numbers between 0 to 10\n\
             Frequency (Hz): ",
            channel
        );
        let frequency = self.number(&question, 0..=ChannelConfig::MAX_FREQUENCY_HZ)?;

        let question = format!(
            "\nSelect {} LED duty cycle.\n\
             Enter whole numbers between 0 to 100\n\
             Duty Cycle (%): ",
            channel
        );
        let duty_cycle = self.number(&question, 0..=ChannelConfig::MAX_PERCENT)?;

        let question = format!(
            "\nSelect {} LED brightness during blink.\n\
             Enter whole numbers between 0 to 100\n\
             Brightness (%): ",
            channel
        );
        let brightness = self.number(&question, 0..=ChannelConfig::MAX_PERCENT)?;

        ChannelConfig::new(frequency, duty_cycle, brightness)
    }

    /// Shows the selected configurations and asks for confirmation.
    pub fn confirm(
        &mut self,
        selection: &[(ChannelId, ChannelConfig)],
    ) -> Result<bool, ConfigError> {
        let mut summary = String::from("\nConfirm your blink configurations.\n");
        for (channel, config) in selection {
            summary.push_str(&format!(
                "\n{} LED:\n  - Frequency: {}Hz\n  - Duty Cycle: {}%\n  - Brightness: {}%\n",
                channel,
                config.frequency_hz(),
                config.duty_cycle_percent(),
                config.brightness_percent()
            ));
        }
        summary.push_str("\n[1] Confirm Configuration\n[0] Return to Home\n\nYour Selection: ");

        Ok(self.number(&summary, 0..=1)? == 1)
    }

    fn number(&mut self, question: &str, range: RangeInclusive<u32>) -> Result<u32, ConfigError> {
        let accept = |answer: u32| Some(answer).filter(|answer| range.contains(answer));
        self.ask(question, accept)
    }

    fn ask<T, F>(&mut self, question: &str, mut accept: F) -> Result<T, ConfigError>
    where
        F: FnMut(u32) -> Option<T>,
    {
        for _ in 0..self.max_attempts {
            write!(self.output, "{}", question).map_err(ConfigError::Input)?;
            self.output.flush().map_err(ConfigError::Input)?;

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => return Err(ConfigError::InputClosed),
                Ok(_) => {}
                Err(err) => return Err(ConfigError::Input(err)),
            }

            if let Some(value) = line.trim().parse().ok().and_then(&mut accept) {
                return Ok(value);
            }

            log::debug!("rejected operator answer {:?}", line.trim());
            writeln!(self.output, "\nInvalid Input. Try Again...").map_err(ConfigError::Input)?;
        }

        Err(ConfigError::TooManyAttempts(self.max_attempts))
    }
}

/// Maps a typed number onto a numbered menu entry.
fn choice<T: TryFrom<u8>>(answer: u32) -> Option<T> {
    T::try_from(u8::try_from(answer).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompt(answers: &str) -> Prompt<Cursor<Vec<u8>>, Vec<u8>> {
        Prompt::new(Cursor::new(answers.as_bytes().to_vec()), Vec::new(), 3)
    }

    #[test]
    fn menu_retries_until_valid_choice() {
        let mut prompt = prompt("9\nabc\n3\n");
        assert_eq!(prompt.main_menu().unwrap(), MenuChoice::BlinkAll);

        let output = String::from_utf8(prompt.into_output()).unwrap();
        assert_eq!(output.matches("Invalid Input. Try Again...").count(), 2);
    }

    #[test]
    fn retries_are_bounded() {
        let mut prompt = prompt("11\n12\n-1\n5\n");
        let err = prompt.channel_config(ChannelId::Green).unwrap_err();
        assert!(matches!(err, ConfigError::TooManyAttempts(3)));
    }

    #[test]
    fn closed_input_stops_asking() {
        let mut prompt = prompt("1\n");
        prompt.main_menu().unwrap();
        assert!(matches!(prompt.main_menu(), Err(ConfigError::InputClosed)));
    }

    #[test]
    fn channel_config_collects_three_values() {
        let mut prompt = prompt("0\n5\n50\n80\n");
        assert_eq!(prompt.channel().unwrap(), ChannelId::Green);

        let config = prompt.channel_config(ChannelId::Green).unwrap();
        assert_eq!(config, ChannelConfig::new(5, 50, 80).unwrap());
    }

    #[test]
    fn confirmation_lists_every_channel() {
        let green = ChannelConfig::new(5, 50, 80).unwrap();
        let red = ChannelConfig::new(2, 10, 100).unwrap();
        let selection = [(ChannelId::Green, green), (ChannelId::Red, red)];
        let mut prompt = prompt("1\n");

        assert!(prompt.confirm(&selection).unwrap());

        let output = String::from_utf8(prompt.into_output()).unwrap();
        assert!(output.contains("Green LED:\n  - Frequency: 5Hz\n  - Duty Cycle: 50%\n"));
        assert!(output.contains("  - Brightness: 80%"));
        assert!(output.contains("Red LED:\n  - Frequency: 2Hz"));
    }

    #[test]
    fn declining_returns_false() {
        let mut prompt = prompt(" 0 \n");
        assert!(!prompt.confirm(&[]).unwrap());
    }
}
