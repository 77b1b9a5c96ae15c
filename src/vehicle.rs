use serde_derive::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Bicycle,
    Motorcycle,
    Car,
    Bus,
    Truck,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 5] = [
        VehicleClass::Bicycle,
        VehicleClass::Motorcycle,
        VehicleClass::Car,
        VehicleClass::Bus,
        VehicleClass::Truck,
    ];

    /// Maps a tracker label onto the vehicle set, `None` for everything else.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "bicycle" => Some(VehicleClass::Bicycle),
            "motorcycle" | "motorbike" => Some(VehicleClass::Motorcycle),
            "car" => Some(VehicleClass::Car),
            "bus" => Some(VehicleClass::Bus),
            "truck" => Some(VehicleClass::Truck),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Bicycle => "bicycle",
            VehicleClass::Motorcycle => "motorcycle",
            VehicleClass::Car => "car",
            VehicleClass::Bus => "bus",
            VehicleClass::Truck => "truck",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One counter per vehicle class, serialized as `{"bicycle": n, ...}`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    #[serde(default)]
    pub bicycle: u64,
    #[serde(default)]
    pub motorcycle: u64,
    #[serde(default)]
    pub car: u64,
    #[serde(default)]
    pub bus: u64,
    #[serde(default)]
    pub truck: u64,
}

impl ClassCounts {
    #[inline]
    pub fn get(&self, class: VehicleClass) -> u64 {
        match class {
            VehicleClass::Bicycle => self.bicycle,
            VehicleClass::Motorcycle => self.motorcycle,
            VehicleClass::Car => self.car,
            VehicleClass::Bus => self.bus,
            VehicleClass::Truck => self.truck,
        }
    }

    #[inline]
    fn slot_mut(&mut self, class: VehicleClass) -> &mut u64 {
        match class {
            VehicleClass::Bicycle => &mut self.bicycle,
            VehicleClass::Motorcycle => &mut self.motorcycle,
            VehicleClass::Car => &mut self.car,
            VehicleClass::Bus => &mut self.bus,
            VehicleClass::Truck => &mut self.truck,
        }
    }

    #[inline]
    pub fn increment(&mut self, class: VehicleClass) {
        *self.slot_mut(class) += 1;
    }

    pub fn add(&mut self, other: &ClassCounts) {
        for class in VehicleClass::ALL {
            *self.slot_mut(class) += other.get(class);
        }
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.iter().map(|(_, n)| n).sum()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (VehicleClass, u64)> + '_ {
        VehicleClass::ALL.iter().map(move |&c| (c, self.get(c)))
    }
}
