//! Typed decode of validated sentences.
//!
//! Each recognized sentence type maps onto one [`NavMessage`] variant.
//! Unknown types decode to `None` and are ignored by every collector.

use crate::types::{
    EnergyCounters, Position, TaggedReading, TrueWind, UtcFix, WindReading, WindSide, KMH_TO_MS,
    KNOTS_TO_MS,
};

use super::Sentence;

/// Which heading sentence produced a [`NavMessage::Heading`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadingKind {
    True,
    Magnetic,
    Sensor,
}

/// Depth sentence flavour, DPT carries the transducer offset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthKind {
    Dpt,
    Dbt,
}

/// Vendor electrical/thermal telemetry, each channel independently optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvTelemetry {
    pub voltage: Option<TaggedReading>,
    pub current: Option<TaggedReading>,
    pub temperature: Option<TaggedReading>,
    pub energy: Option<EnergyCounters>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NavMessage {
    /// RMC: position, course and speed over ground, time and date
    Rmc {
        utc: UtcFix,
        valid: bool,
        position: Option<Position>,
        sog_knots: Option<f64>,
        cog_deg: Option<f64>,
    },
    /// GLL: position only
    Gll { position: Option<Position> },
    /// VTG: course and speed over ground
    Vtg {
        cog_deg: Option<f64>,
        sog_knots: Option<f64>,
    },
    /// HDT / HDG / HDM
    Heading { kind: HeadingKind, degrees: f64 },
    /// VHW: speed through water
    WaterSpeed { stw_knots: f64 },
    /// DPT (depth + offset) or DBT (depth below transducer)
    Depth { kind: DepthKind, metres: f64 },
    /// MTW: water temperature
    WaterTemperature { celsius: f64 },
    /// MWV relative or VWR, normalized
    RelativeWind { wind: WindReading, legacy: bool },
    /// MWV true
    TrueWind(TrueWind),
    /// `$P…ENV` vendor telemetry
    Environment(EnvTelemetry),
}

impl NavMessage {
    /// Decode a validated sentence, `None` for unknown or unusable ones.
    pub fn decode(sentence: &Sentence) -> Option<NavMessage> {
        match sentence.kind() {
            "RMC" => Some(decode_rmc(sentence)),
            "GLL" => Some(NavMessage::Gll {
                position: position_at(sentence, 1),
            }),
            "VTG" => Some(NavMessage::Vtg {
                cog_deg: sentence.number(1),
                sog_knots: sentence.number(5),
            }),
            "HDT" => heading(sentence, HeadingKind::True),
            "HDM" => heading(sentence, HeadingKind::Magnetic),
            "HDG" => heading(sentence, HeadingKind::Sensor),
            "VHW" => sentence
                .number(5)
                .map(|stw_knots| NavMessage::WaterSpeed { stw_knots }),
            "DPT" => sentence.number(1).map(|depth| NavMessage::Depth {
                kind: DepthKind::Dpt,
                metres: depth + sentence.number(2).unwrap_or(0.0),
            }),
            "DBT" => sentence.number(3).map(|metres| NavMessage::Depth {
                kind: DepthKind::Dbt,
                metres,
            }),
            "MTW" => sentence
                .number(1)
                .map(|celsius| NavMessage::WaterTemperature { celsius }),
            "MWV" => decode_mwv(sentence),
            "VWR" => decode_vwr(sentence),
            "ENV" if sentence.is_proprietary() || sentence.field_count() >= 9 => {
                Some(NavMessage::Environment(decode_env(sentence)))
            }
            _ => None,
        }
    }
}

fn decode_rmc(s: &Sentence) -> NavMessage {
    NavMessage::Rmc {
        utc: UtcFix {
            time: s.field(1).to_string(),
            date: s.field(9).to_string(),
        },
        valid: s.letter(2) == Some('A'),
        position: position_at(s, 3),
        sog_knots: s.number(7),
        cog_deg: s.number(8),
    }
}

/// Position from four consecutive fields starting at `first`.
fn position_at(s: &Sentence, first: usize) -> Option<Position> {
    let latitude = s.field(first);
    let longitude = s.field(first + 2);
    if latitude.is_empty() || longitude.is_empty() {
        return None;
    }
    Some(Position {
        latitude: latitude.to_string(),
        lat_hemisphere: s.field(first + 1).to_string(),
        longitude: longitude.to_string(),
        lon_hemisphere: s.field(first + 3).to_string(),
    })
}

fn heading(s: &Sentence, kind: HeadingKind) -> Option<NavMessage> {
    s.number(1).map(|degrees| NavMessage::Heading { kind, degrees })
}

fn speed_to_ms(speed: f64, unit: Option<char>) -> Option<f64> {
    match unit {
        Some('N') => Some(speed * KNOTS_TO_MS),
        Some('M') => Some(speed),
        Some('K') => Some(speed * KMH_TO_MS),
        _ => None,
    }
}

fn decode_mwv(s: &Sentence) -> Option<NavMessage> {
    if s.letter(5) == Some('V') {
        return None;
    }
    let angle = s.number(1)?;
    let speed_ms = speed_to_ms(s.number(3)?, s.letter(4))?;
    match s.letter(2)? {
        'R' => Some(NavMessage::RelativeWind {
            wind: WindReading::from_clockwise(angle, speed_ms),
            legacy: false,
        }),
        'T' => Some(NavMessage::TrueWind(TrueWind {
            angle_deg: angle.rem_euclid(360.0),
            speed_ms,
        })),
        _ => None,
    }
}

fn decode_vwr(s: &Sentence) -> Option<NavMessage> {
    let angle = s.number(1)?;
    let side = match s.letter(2) {
        Some('R') => WindSide::Starboard,
        _ => WindSide::Port,
    };
    // Knots first, then m/s, then km/h
    let speed_ms = s
        .number(3)
        .map(|kn| kn * KNOTS_TO_MS)
        .or_else(|| s.number(5))
        .or_else(|| s.number(7).map(|kmh| kmh * KMH_TO_MS))?;
    Some(NavMessage::RelativeWind {
        wind: WindReading {
            angle_deg: angle.clamp(0.0, 180.0),
            side,
            speed_ms,
        },
        legacy: true,
    })
}

fn decode_env(s: &Sentence) -> EnvTelemetry {
    let tagged = |value: usize, tag: usize| {
        s.number(value).map(|value| TaggedReading {
            value,
            tag: s.integer(tag).unwrap_or(0),
        })
    };
    let energy = match (s.number(7), s.number(8)) {
        (None, None) => None,
        (charged, consumed) => Some(EnergyCounters {
            charged_kwh: charged.unwrap_or(0.0),
            consumed_kwh: consumed.unwrap_or(0.0),
            server_start: s.integer(9).unwrap_or(0),
        }),
    };
    EnvTelemetry {
        voltage: tagged(1, 2),
        current: tagged(3, 4),
        temperature: tagged(5, 6),
        energy,
    }
}
