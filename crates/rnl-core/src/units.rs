// rnl-core/src/units.rs

use uom::si::f64::{
    Area as UomArea, Length as UomLength, Time as UomTime, Velocity as UomVelocity,
    Volume as UomVolume, VolumeRate as UomVolumeRate,
};

use crate::numeric::{Real, round_to_precision};

// Public canonical unit types (SI, f64)
pub type Area = UomArea;
pub type Length = UomLength;
pub type Time = UomTime;
pub type Velocity = UomVelocity;
pub type Volume = UomVolume;
pub type FlowRate = UomVolumeRate;

pub const SECONDS_PER_DAY: Real = 86_400.0;

#[inline]
pub fn m(v: f64) -> Length {
    use uom::si::length::meter;
    Length::new::<meter>(v)
}

#[inline]
pub fn mm(v: f64) -> Length {
    use uom::si::length::millimeter;
    Length::new::<millimeter>(v)
}

#[inline]
pub fn m2(v: f64) -> Area {
    use uom::si::area::square_meter;
    Area::new::<square_meter>(v)
}

#[inline]
pub fn days(v: f64) -> Time {
    use uom::si::time::day;
    Time::new::<day>(v)
}

#[inline]
pub fn m3ps(v: f64) -> FlowRate {
    use uom::si::volume_rate::cubic_meter_per_second;
    FlowRate::new::<cubic_meter_per_second>(v)
}

/// Flow rate in m³/s of a specific discharge (mm/day) falling on `area_m2`.
pub fn specific_discharge_to_flow(mm_per_day: Real, area_m2: Real) -> FlowRate {
    let volume: Volume = mm(mm_per_day) * m2(area_m2);
    volume / days(1.0)
}

/// Convert mm/day over an area to m³/s, rounded to the nearest multiple of `precision`.
pub fn mm_per_day_to_m3_per_second(mm_per_day: Real, area_m2: Real, precision: Real) -> Real {
    use uom::si::volume_rate::cubic_meter_per_second;
    let q = specific_discharge_to_flow(mm_per_day, area_m2).get::<cubic_meter_per_second>();
    round_to_precision(q, precision)
}

/// Convert mm/day to m/s (a depth rate, as used by Basin forcing columns).
pub fn mm_per_day_to_m_per_second(mm_per_day: Real) -> Real {
    use uom::si::velocity::meter_per_second;
    let rate: Velocity = mm(mm_per_day) / days(1.0);
    rate.get::<meter_per_second>()
}
