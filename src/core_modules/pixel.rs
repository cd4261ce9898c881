// THEORY:
// The `Pixel` module is the most fundamental unit of the engine. A `Pixel` is a "dumb"
// container for one RGB(A) sample plus the handful of single-pixel heuristics the
// sampler and the change gate need: extreme channels, chroma (max−min spread) and the
// channel-sum distance to another sample.
//
// Key principles:
// 1) Single-pixel scope: nothing here reads neighbors, history or settings.
// 2) Integer math: every heuristic works on the raw 0..255 bytes so results are exact
//    and the hot loops never touch floating point.
// 3) Alpha is carried but ignored by every heuristic; camera frames are opaque.

pub mod pixel {
    pub type Channel = u8;
    pub type Chroma = u8;
    pub type ChannelDistance = u16;

    /// A single RGBA sample. RGB frames load with an opaque alpha.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self {
                red,
                green,
                blue,
                alpha,
            }
        }

        pub fn rgb(red: Channel, green: Channel, blue: Channel) -> Self {
            Self::new(red, green, blue, Channel::MAX)
        }

        /// Builds a pixel from 3 (RGB) or 4 (RGBA) bytes.
        pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
            match *bytes {
                [r, g, b] => Some(Self::rgb(r, g, b)),
                [r, g, b, a] => Some(Self::new(r, g, b, a)),
                _ => None,
            }
        }

        pub fn max_channel(&self) -> Channel {
            self.red.max(self.green).max(self.blue)
        }

        pub fn min_channel(&self) -> Channel {
            self.red.min(self.green).min(self.blue)
        }

        /// Chroma (C): color purity = max(R,G,B) - min(R,G,B).
        pub fn chroma(&self) -> Chroma {
            self.max_channel() - self.min_channel()
        }

        /// True when every channel is at or below `threshold`.
        pub fn is_black(&self, threshold: Channel) -> bool {
            self.max_channel() <= threshold
        }

        /// True when every channel is at or above `threshold`.
        pub fn is_white(&self, threshold: Channel) -> bool {
            self.min_channel() >= threshold
        }

        /// |ΔR| + |ΔG| + |ΔB| against another sample (0..=765).
        pub fn channel_distance(&self, other: &Pixel) -> ChannelDistance {
            self.red.abs_diff(other.red) as ChannelDistance
                + self.green.abs_diff(other.green) as ChannelDistance
                + self.blue.abs_diff(other.blue) as ChannelDistance
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn from_bytes_accepts_rgb_and_rgba() {
        assert_eq!(Pixel::from_bytes(&[1, 2, 3]), Some(Pixel::new(1, 2, 3, 255)));
        assert_eq!(Pixel::from_bytes(&[1, 2, 3, 4]), Some(Pixel::new(1, 2, 3, 4)));
        assert_eq!(Pixel::from_bytes(&[1, 2]), None);
    }

    #[test]
    fn chroma_is_channel_spread() {
        assert_eq!(Pixel::rgb(200, 50, 120).chroma(), 150);
        assert_eq!(Pixel::rgb(90, 90, 90).chroma(), 0);
    }

    #[test]
    fn black_and_white_thresholds_are_inclusive() {
        assert!(Pixel::rgb(30, 30, 30).is_black(30));
        assert!(!Pixel::rgb(31, 0, 0).is_black(30));
        assert!(Pixel::rgb(225, 240, 255).is_white(225));
        assert!(!Pixel::rgb(224, 255, 255).is_white(225));
    }

    #[test]
    fn channel_distance_sums_absolute_differences() {
        let a = Pixel::rgb(10, 200, 50);
        let b = Pixel::rgb(20, 190, 50);
        assert_eq!(a.channel_distance(&b), 20);
        assert_eq!(Pixel::rgb(0, 0, 0).channel_distance(&Pixel::rgb(255, 255, 255)), 765);
    }
}
