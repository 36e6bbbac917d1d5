//! Board abstraction and pin mapping for the emulated microcontroller.

/// The board variants the emulator knows how to model. Two layouts have been
/// identified: mega-like (70 pins) and uno-like (20 pins).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    Uno,
    Mega,
}

impl BoardKind {
    /// Resolve a board-type string. Unknown strings fall back to the
    /// uno-class profile rather than failing.
    pub fn resolve(kind: &str) -> Self {
        let key = kind.trim().to_ascii_lowercase();
        if key.contains("mega") {
            BoardKind::Mega
        } else if key.contains("uno") {
            BoardKind::Uno
        } else {
            tracing::warn!("unknown board type '{}', defaulting to uno", kind);
            BoardKind::Uno
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoardKind::Uno => "uno",
            BoardKind::Mega => "mega",
        }
    }

    pub fn pin_count(&self) -> usize {
        match self {
            BoardKind::Uno => 20,
            BoardKind::Mega => 70,
        }
    }
}

impl std::fmt::Display for BoardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a board's pin table. Immutable once constructed; the table is
/// regenerated only when the board profile changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinDefinition {
    pub address: usize,
    pub name: String,
    pub digital: bool,
    pub analog: bool,
    pub pwm: bool,
    pub rx: bool,
    pub tx: bool,
    pub writable: bool,
}

impl PinDefinition {
    fn new(address: usize) -> Self {
        Self {
            address,
            name: String::new(),
            digital: false,
            analog: false,
            pwm: false,
            rx: false,
            tx: false,
            writable: true,
        }
    }
}

/// Generate the deterministic pin table for a board kind.
///
/// Address 0 is the serial receive pin and address 1 the transmit pin on both
/// layouts. On the mega layout address 1 intentionally lands in the pwm
/// branch, matching the hardware map this emulates.
pub fn pin_table(kind: BoardKind) -> Vec<PinDefinition> {
    let mut pins = Vec::with_capacity(kind.pin_count());
    match kind {
        BoardKind::Mega => {
            for i in 0..70 {
                let mut pindef = PinDefinition::new(i);
                if i == 0 {
                    pindef.rx = true;
                }
                if i == 1 {
                    pindef.tx = true;
                }
                if i < 1 || (i > 13 && i < 54) {
                    pindef.name = format!("D{}", i);
                    pindef.digital = true;
                } else if i > 53 {
                    pindef.name = format!("A{}", i - 54);
                    pindef.analog = true;
                    pindef.digital = false;
                    pindef.writable = false;
                } else {
                    pindef.name = format!("D{}", i);
                    pindef.pwm = true;
                }
                pins.push(pindef);
            }
        }
        BoardKind::Uno => {
            for i in 0..20 {
                let mut pindef = PinDefinition::new(i);
                if i == 0 {
                    pindef.rx = true;
                }
                if i == 1 {
                    pindef.tx = true;
                }
                if i < 14 {
                    pindef.name = format!("D{}", i);
                    pindef.digital = true;
                } else {
                    pindef.name = format!("A{}", i - 14);
                    pindef.analog = true;
                    pindef.digital = false;
                    pindef.writable = false;
                }
                if matches!(i, 3 | 5 | 6 | 9 | 10 | 11) {
                    pindef.pwm = true;
                }
                pins.push(pindef);
            }
        }
    }
    pins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uno_table_layout() {
        let pins = pin_table(BoardKind::Uno);
        assert_eq!(pins.len(), 20);
        assert!(pins[0].rx);
        assert!(pins[1].tx);
        for i in 0..14 {
            assert!(pins[i].digital, "D{} should be digital", i);
            assert_eq!(pins[i].name, format!("D{}", i));
        }
        for addr in [3, 5, 6, 9, 10, 11] {
            assert!(pins[addr].pwm, "D{} should be pwm capable", addr);
        }
        for addr in 14..20 {
            assert!(pins[addr].analog);
            assert!(!pins[addr].writable);
            assert!(!pins[addr].digital);
            assert_eq!(pins[addr].name, format!("A{}", addr - 14));
        }
    }

    #[test]
    fn mega_table_layout() {
        let pins = pin_table(BoardKind::Mega);
        assert_eq!(pins.len(), 70);
        assert!(pins[0].rx);
        assert!(pins[0].digital);
        assert!(pins[1].tx);
        assert!(pins[1].pwm);
        for addr in 14..54 {
            assert!(pins[addr].digital);
            assert_eq!(pins[addr].name, format!("D{}", addr));
        }
        for addr in 54..70 {
            assert!(pins[addr].analog);
            assert!(!pins[addr].writable);
            assert_eq!(pins[addr].name, format!("A{}", addr - 54));
        }
    }

    #[test]
    fn pin_addresses_are_ordered() {
        for kind in [BoardKind::Uno, BoardKind::Mega] {
            let pins = pin_table(kind);
            for (i, pin) in pins.iter().enumerate() {
                assert_eq!(pin.address, i);
            }
        }
    }

    #[test]
    fn unknown_board_resolves_to_uno() {
        assert_eq!(BoardKind::resolve("uno"), BoardKind::Uno);
        assert_eq!(BoardKind::resolve("Arduino Mega 2560"), BoardKind::Mega);
        assert_eq!(BoardKind::resolve("megaadk"), BoardKind::Mega);
        assert_eq!(BoardKind::resolve("esp32"), BoardKind::Uno);
        assert_eq!(BoardKind::resolve(""), BoardKind::Uno);
    }
}
