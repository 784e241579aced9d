//! Strip drivers for running without LED hardware.

use smart_leds::{SmartLedsWrite, RGB8};
use std::convert::Infallible;
use std::io::{self, Stdout, Write};

/// Draws each frame as one line of ANSI true-colour blocks.
pub struct ConsoleStrip<Wr = Stdout> {
    out: Wr,
}

impl ConsoleStrip {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<Wr: Write> ConsoleStrip<Wr> {
    pub fn new(out: Wr) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> Wr {
        self.out
    }
}

impl<Wr: Write> SmartLedsWrite for ConsoleStrip<Wr> {
    type Error = io::Error;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        let mut line = String::new();
        for color in iterator {
            let c: RGB8 = color.into();
            if c == RGB8::default() {
                line.push('·');
            } else {
                line.push_str(&format!("\x1b[38;2;{};{};{}m█", c.r, c.g, c.b));
            }
        }
        line.push_str("\x1b[0m");
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}

/// Discards every frame
pub struct NullStrip;

impl SmartLedsWrite for NullStrip {
    type Error = Infallible;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        iterator.into_iter().for_each(drop);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_line() {
        let mut strip = ConsoleStrip::new(Vec::new());
        strip
            .write([RGB8::default(), RGB8::new(255, 0, 0), RGB8::default()])
            .unwrap();

        let out = String::from_utf8(strip.into_inner()).unwrap();
        assert_eq!(out, "·\x1b[38;2;255;0;0m█·\x1b[0m\n");
    }

    #[test]
    fn test_console_one_line_per_frame() {
        let mut strip = ConsoleStrip::new(Vec::new());
        strip.write([RGB8::default(); 4]).unwrap();
        strip.write([RGB8::new(0, 0, 255); 2]).unwrap();

        let out = String::from_utf8(strip.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "····\x1b[0m");
        assert_eq!(lines[1].matches('█').count(), 2);
    }

    #[test]
    fn test_null_strip_accepts_frames() {
        assert!(NullStrip.write([RGB8::new(1, 2, 3); 65]).is_ok());
    }
}
