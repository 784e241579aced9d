use log::debug;
use smart_leds::{brightness, gamma, SmartLedsWrite, RGB8};
use tramlights_position_lib::LedColorMap;

/// Owns the strip driver and turns colour maps into full frames.
pub struct LedController<W> {
    driver: W,
    led_count: usize,
    brightness: u8,
}

impl<W> LedController<W>
where
    W: SmartLedsWrite<Color = RGB8>,
{
    pub fn new(driver: W, led_count: usize, initial_brightness: u8) -> Self {
        debug!("Creating LED controller for {led_count} LEDs with brightness {initial_brightness}");
        Self {
            driver,
            led_count,
            brightness: initial_brightness,
        }
    }

    /// Clear the whole strip, then light the mapped LEDs, in a single write.
    pub fn render(&mut self, map: &LedColorMap) -> Result<(), W::Error> {
        let frame = map.to_frame(self.led_count);
        debug!("LED update: {} of {} LEDs lit", map.len(), self.led_count);
        self.write_leds(&frame)
    }

    /// Turn every LED off
    pub fn clear(&mut self) -> Result<(), W::Error> {
        let frame = vec![RGB8::default(); self.led_count];
        self.write_leds(&frame)
    }

    fn write_leds(&mut self, leds: &[RGB8]) -> Result<(), W::Error> {
        // Apply gamma correction first, then brightness reduction
        // as recommended by smart-leds docs
        self.driver
            .write(brightness(gamma(leds.iter().copied()), self.brightness))
    }

    #[cfg(test)]
    pub fn driver(&self) -> &W {
        &self.driver
    }
}
