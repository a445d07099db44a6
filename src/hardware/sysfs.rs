//! Linux sysfs board backend
//!
//! The lgw4m-8di kernel driver exposes one file per signal:
//! - /sys/kernel/lgw4m-8di/inN_value, inN_counter, inN_periode
//! - /sys/class/leds/{led_orange,led_green,output1,output2}/brightness

use crate::core::{Error, Result};
use crate::hardware::{pin_path, PinSource};
use std::fs;
use std::path::{Path, PathBuf};

/// Board accessed through its sysfs files
pub struct SysfsBoard {
    input_dir: PathBuf,
    led_dir: PathBuf,
}

impl SysfsBoard {
    /// Use the board at the given directories, failing if either is absent
    pub fn detect(input_dir: &Path, led_dir: &Path) -> Result<Self> {
        if !input_dir.is_dir() {
            return Err(Error::HardwareNotSupported(format!(
                "input directory {:?} not found",
                input_dir
            )));
        }
        if !led_dir.is_dir() {
            return Err(Error::HardwareNotSupported(format!(
                "LED directory {:?} not found",
                led_dir
            )));
        }

        Ok(Self {
            input_dir: input_dir.to_path_buf(),
            led_dir: led_dir.to_path_buf(),
        })
    }

    fn path(&self, address: u8) -> Result<PathBuf> {
        pin_path(address, &self.input_dir, &self.led_dir)
    }
}

impl PinSource for SysfsBoard {
    fn read(&self, address: u8) -> Result<String> {
        let path = self.path(address)?;
        if !path.exists() {
            return Err(Error::ResourceMissing { address, path });
        }
        let value = fs::read_to_string(&path)?;
        log::trace!("read pin {} ({:?}) = {:?}", address, path, value);
        Ok(value)
    }

    fn write(&self, address: u8, value: &str) -> Result<()> {
        let path = self.path(address)?;
        log::trace!("write pin {} ({:?}) = {:?}", address, path, value);
        fs::write(&path, value)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "lgw4m-8di sysfs"
    }

    fn is_emulated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ChannelSample;

    fn fake_board() -> (tempfile::TempDir, SysfsBoard) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("lgw4m-8di");
        let leds = dir.path().join("leds");
        fs::create_dir_all(&input).unwrap();
        for led in ["led_orange", "led_green", "output1", "output2"] {
            fs::create_dir_all(leds.join(led)).unwrap();
            fs::write(leds.join(led).join("brightness"), "0\n").unwrap();
        }
        let board = SysfsBoard::detect(&input, &leds).unwrap();
        (dir, board)
    }

    #[test]
    fn test_detect_requires_both_directories() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("lgw4m-8di");
        fs::create_dir_all(&input).unwrap();

        assert!(matches!(
            SysfsBoard::detect(&input, &dir.path().join("leds")),
            Err(Error::HardwareNotSupported(_))
        ));
    }

    #[test]
    fn test_read_channel_scales_period() {
        let (dir, board) = fake_board();
        let input = dir.path().join("lgw4m-8di");
        fs::write(input.join("in6_value"), "1\n").unwrap();
        fs::write(input.join("in6_counter"), "42\n").unwrap();
        fs::write(input.join("in6_periode"), "1500999\n").unwrap();

        let sample = board.read_channel(6).unwrap();
        assert_eq!(
            sample,
            ChannelSample {
                status: 1,
                counter: 42,
                period_ms: 1500,
            }
        );
    }

    #[test]
    fn test_missing_file_reported() {
        let (_dir, board) = fake_board();

        match board.read(2) {
            Err(Error::ResourceMissing { address, path }) => {
                assert_eq!(address, 2);
                assert!(path.ends_with("in2_value"));
            }
            other => panic!("expected ResourceMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_write_output() {
        let (dir, board) = fake_board();

        board.write(10, "1").unwrap();
        let content = fs::read_to_string(dir.path().join("leds/output1/brightness")).unwrap();
        assert_eq!(content, "1");
        assert_eq!(board.read(10).unwrap(), "1");
    }
}
