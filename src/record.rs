// Fixed-layout digitizer event records
//
// Every record carries the channel it was digitized on and the channel-local
// clock value. The local clock counts up during an acquisition epoch and
// restarts at the next one, so values are only comparable within an epoch.
// Payload fields (charge, baseline) are opaque to the windowing engine.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Shape the windowing engine needs from an event record.
pub trait Record: Copy + Debug + Send + 'static {
    /// Channel-local clock type. `Default` is the zero high-water mark.
    type Time: Copy + Ord + Default + Debug + Send + 'static;

    fn channel(&self) -> usize;

    fn local_time(&self) -> Self::Time;
}

/// List-mode event with a 32-bit trigger time tag and 16-bit charge.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ListElement422 {
    pub local_time: u32,
    pub channel: u16,
    pub charge: u16,
}

impl ListElement422 {
    pub fn new(channel: u16, local_time: u32, charge: u16) -> Self {
        Self {
            local_time,
            channel,
            charge,
        }
    }
}

impl Record for ListElement422 {
    type Time = u32;

    fn channel(&self) -> usize {
        self.channel as usize
    }

    fn local_time(&self) -> u32 {
        self.local_time
    }
}

/// List-mode event for digitizers with an extended 64-bit time tag.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ListElement8222 {
    pub local_time: u64,
    pub channel: u16,
    pub charge: u16,
    pub baseline: u16,
}

impl ListElement8222 {
    pub fn new(channel: u16, local_time: u64, charge: u16, baseline: u16) -> Self {
        Self {
            local_time,
            channel,
            charge,
            baseline,
        }
    }
}

impl Record for ListElement8222 {
    type Time = u64;

    fn channel(&self) -> usize {
        self.channel as usize
    }

    fn local_time(&self) -> u64 {
        self.local_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_element_accessors() {
        let e = ListElement422::new(7, 1234, 42);
        assert_eq!(e.channel(), 7);
        assert_eq!(e.local_time(), 1234);
        assert_eq!(e.charge, 42);

        let wide = ListElement8222::new(3, u64::from(u32::MAX) + 1, 8, 2);
        assert_eq!(wide.channel(), 3);
        assert_eq!(wide.local_time(), 1 << 32);
        assert_eq!((wide.charge, wide.baseline), (8, 2));
    }

    #[test]
    fn test_default_time_is_zero_mark() {
        assert_eq!(<ListElement422 as Record>::Time::default(), 0);
        assert_eq!(<ListElement8222 as Record>::Time::default(), 0);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(ListElement422::new(3, 99, 5)).unwrap();
        assert_eq!(json["channel"], 3);
        assert_eq!(json["local_time"], 99);
        assert_eq!(json["charge"], 5);
    }
}
