//! Line-discipline and engine configuration.
//!
//! `SerialConfig` is immutable once handed to the engine: the device opener
//! consumes it to program the tty and the resulting descriptor is all the
//! engine ever sees.

/// Character size in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Parity generation and checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Flow control discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    /// RTS/CTS hardware flow control.
    RtsCts,
    /// XON/XOFF software flow control.
    XonXoff,
}

/// Full line configuration for one serial device.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub device_path: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    /// Assert the RTS and DTR modem lines after configuration.
    pub rts_dtr_on: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device_path: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            rts_dtr_on: false,
        }
    }
}

/// Engine sizing knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Submission ring depth. The request table is sized to this and the
    /// write buffer pool to twice this.
    pub queue_depth: u32,
    /// Default capacity of pooled write buffers.
    pub buffer_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_depth: 256,
            buffer_capacity: 8192,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_defaults() {
        let cfg = SerialConfig::default();
        assert_eq!(cfg.device_path, "/dev/ttyUSB0");
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.data_bits, DataBits::Eight);
        assert_eq!(cfg.stop_bits, StopBits::One);
        assert_eq!(cfg.parity, Parity::None);
        assert_eq!(cfg.flow_control, FlowControl::None);
        assert!(!cfg.rts_dtr_on);
    }

    #[test]
    fn test_engine_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.queue_depth, 256);
        assert_eq!(cfg.buffer_capacity, 8192);
    }
}
