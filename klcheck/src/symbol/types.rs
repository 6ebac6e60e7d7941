use std::fmt;
use std::str::FromStr;

use super::{mil_to_mm, FormatError};
use crate::geometry::Point;
use crate::parser::SExp;

/// Default text and pin-name size, 50 mil.
pub(crate) const DEFAULT_TEXT_SIZE: f64 = 1.27;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Justify {
    Left,
    Right,
    Top,
    Bottom,
    #[default]
    Center,
}

impl Justify {
    pub fn as_str(&self) -> &'static str {
        match self {
            Justify::Left => "left",
            Justify::Right => "right",
            Justify::Top => "top",
            Justify::Bottom => "bottom",
            Justify::Center => "center",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextEffect {
    pub size_x: f64,
    pub size_y: f64,
    pub thickness: Option<f64>,
    pub face: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub mirrored: bool,
    pub h_justify: Justify,
    pub v_justify: Justify,
    pub color: Option<Color>,
    /// Legacy `hide` flag stored inside `effects`.
    pub hidden: bool,
}

impl Default for TextEffect {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_SIZE)
    }
}

impl TextEffect {
    pub fn new(size: f64) -> Self {
        Self {
            size_x: size,
            size_y: size,
            thickness: None,
            face: None,
            bold: false,
            italic: false,
            mirrored: false,
            h_justify: Justify::Center,
            v_justify: Justify::Center,
            color: None,
            hidden: false,
        }
    }

    pub fn new_mil(size: f64) -> Self {
        Self::new(mil_to_mm(size))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub pos: Point,
    pub rotation: f64,
    pub is_hidden: bool,
    pub private: bool,
    pub do_not_autoplace: bool,
    pub effects: TextEffect,
    /// Children this model does not interpret, re-emitted before `effects`.
    pub extra: Vec<SExp>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            pos: Point::origin(),
            rotation: 0.0,
            is_hidden: false,
            private: false,
            do_not_autoplace: false,
            effects: TextEffect::default(),
            extra: Vec::new(),
        }
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Place the property at a position given in mil. Rotations outside
    /// the four right angles are ignored.
    pub fn set_pos_mil(&mut self, x: f64, y: f64, rotation: f64) {
        self.pos = Point::new(mil_to_mm(x), mil_to_mm(y));
        if Rotation::from_degrees(rotation).is_ok() {
            self.rotation = rotation;
        }
    }
}

/// Pin orientation. KiCad only supports multiples of 90 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn from_degrees(degrees: f64) -> Result<Self, FormatError> {
        match degrees {
            d if d == 0.0 => Ok(Rotation::R0),
            d if d == 90.0 => Ok(Rotation::R90),
            d if d == 180.0 => Ok(Rotation::R180),
            d if d == 270.0 => Ok(Rotation::R270),
            other => Err(FormatError::InvalidRotation(other)),
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Direction the pin points away from its connection point:
    /// `R`, `U`, `L` or `D`.
    pub fn direction(&self) -> char {
        match self {
            Rotation::R0 => 'R',
            Rotation::R90 => 'U',
            Rotation::R180 => 'L',
            Rotation::R270 => 'D',
        }
    }

    pub fn from_direction(direction: char) -> Option<Self> {
        match direction {
            'R' => Some(Rotation::R0),
            'U' => Some(Rotation::R90),
            'L' => Some(Rotation::R180),
            'D' => Some(Rotation::R270),
            _ => None,
        }
    }
}

macro_rules! keyword_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = FormatError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(FormatError::UnknownKeyword {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

keyword_enum!(ElectricalType, "pin electrical type", {
    Input => "input",
    Output => "output",
    Bidirectional => "bidirectional",
    TriState => "tri_state",
    Passive => "passive",
    Free => "free",
    Unspecified => "unspecified",
    PowerIn => "power_in",
    PowerOut => "power_out",
    OpenCollector => "open_collector",
    OpenEmitter => "open_emitter",
    NoConnect => "no_connect",
});

keyword_enum!(PinShape, "pin shape", {
    Line => "line",
    Inverted => "inverted",
    Clock => "clock",
    InvertedClock => "inverted_clock",
    InputLow => "input_low",
    ClockLow => "clock_low",
    OutputLow => "output_low",
    EdgeClockHigh => "edge_clock_high",
    NonLogic => "non_logic",
});

impl PinShape {
    /// Shapes that draw an inversion bubble or low-active marker.
    pub fn is_inverted(&self) -> bool {
        matches!(
            self,
            PinShape::Inverted | PinShape::InvertedClock | PinShape::InputLow | PinShape::ClockLow | PinShape::OutputLow
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AltFunction {
    pub name: String,
    pub etype: ElectricalType,
    pub shape: PinShape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub name: String,
    pub number: String,
    pub etype: ElectricalType,
    pub shape: PinShape,
    pub pos: Point,
    pub rotation: Rotation,
    pub length: f64,
    pub is_global: bool,
    pub is_hidden: bool,
    pub name_effect: TextEffect,
    pub number_effect: TextEffect,
    pub alternates: Vec<AltFunction>,
    pub unit: u32,
    pub demorgan: u32,
    pub extra: Vec<SExp>,
}

impl Pin {
    pub fn new(name: impl Into<String>, number: impl Into<String>, etype: ElectricalType) -> Self {
        Self {
            name: name.into(),
            number: number.into(),
            etype,
            shape: PinShape::Line,
            pos: Point::origin(),
            rotation: Rotation::R0,
            length: 2.54,
            is_global: false,
            is_hidden: false,
            name_effect: TextEffect::default(),
            number_effect: TextEffect::default(),
            alternates: Vec::new(),
            unit: 0,
            demorgan: 0,
            extra: Vec::new(),
        }
    }

    pub fn at(mut self, x: f64, y: f64, rotation: Rotation) -> Self {
        self.pos = Point::new(x, y);
        self.rotation = rotation;
        self
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    pub fn in_unit(mut self, unit: u32, demorgan: u32) -> Self {
        self.unit = unit;
        self.demorgan = demorgan;
        self
    }

    /// Pin number as an integer, when it is purely numeric.
    pub fn number_int(&self) -> Option<u64> {
        if !self.number.is_empty() && self.number.bytes().all(|b| b.is_ascii_digit()) {
            self.number.parse().ok()
        } else {
            None
        }
    }

    pub fn direction(&self) -> char {
        self.rotation.direction()
    }

    pub fn is_unit(&self, unit: u32, demorgan: u32) -> bool {
        self.unit == unit && self.demorgan == demorgan
    }

    /// Whether the pin sits at the given position, compared at 6 decimals.
    pub fn is_at(&self, x: f64, y: f64) -> bool {
        let r = |v: f64| (v * 1e6).round();
        r(self.pos.x) == r(x) && r(self.pos.y) == r(y)
    }
}

/// A file attached to a symbol, stored as base64 data chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFile {
    pub name: String,
    pub file_type: String,
    pub data: Vec<String>,
    pub checksum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_domain() {
        assert!(matches!(
            Rotation::from_degrees(45.0),
            Err(FormatError::InvalidRotation(r)) if r == 45.0
        ));
        let dirs: Vec<char> = [0.0, 90.0, 180.0, 270.0]
            .iter()
            .map(|d| Rotation::from_degrees(*d).unwrap().direction())
            .collect();
        assert_eq!(dirs, vec!['R', 'U', 'L', 'D']);
        assert_eq!(Rotation::from_direction('L'), Some(Rotation::R180));
    }

    #[test]
    fn test_keyword_enums() {
        assert_eq!("power_in".parse::<ElectricalType>().unwrap(), ElectricalType::PowerIn);
        assert_eq!(PinShape::InvertedClock.as_str(), "inverted_clock");
        assert!(matches!(
            "sideways".parse::<PinShape>(),
            Err(FormatError::UnknownKeyword { kind: "pin shape", .. })
        ));
    }

    #[test]
    fn test_number_int() {
        let pin = Pin::new("A", "12", ElectricalType::Input);
        assert_eq!(pin.number_int(), Some(12));
        let pin = Pin::new("A", "MP", ElectricalType::Input);
        assert_eq!(pin.number_int(), None);
    }

    #[test]
    fn test_property_pos_mil() {
        let mut prop = Property::new("Reference", "U");
        prop.set_pos_mil(100.0, -50.0, 90.0);
        assert_eq!(prop.pos, Point::new(2.54, -1.27));
        assert_eq!(prop.rotation, 90.0);
        prop.set_pos_mil(0.0, 0.0, 45.0);
        assert_eq!(prop.rotation, 90.0);
    }
}
