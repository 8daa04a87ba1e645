//! Header pin to chip line translation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Highest line number on the main 40-pin header chip.
pub const MAX_CHIP_LINE: u32 = 27;

/// 40-pin header position -> chip line. Power and ground positions are absent.
const HEADER_TO_LINE: [(u32, u32); 26] = [
    (3, 2),
    (5, 3),
    (7, 4),
    (8, 14),
    (10, 15),
    (11, 17),
    (12, 18),
    (13, 27),
    (15, 22),
    (16, 23),
    (18, 24),
    (19, 10),
    (21, 9),
    (22, 25),
    (23, 11),
    (24, 8),
    (26, 7),
    (29, 5),
    (31, 6),
    (32, 12),
    (33, 13),
    (35, 19),
    (36, 16),
    (37, 26),
    (38, 20),
    (40, 21),
];

/// How configured port numbers are to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinNumbering {
    /// Ports are chip line offsets and are used as-is
    #[default]
    Chip,
    /// Ports are physical header positions
    Header,
}

/// Translate a physical header position to a chip line.
///
/// Numbers missing from the header table are passed through when they are
/// already a valid chip line, so either convention may be used.
pub fn to_chip_pin(connector_pin: u32) -> Option<u32> {
    HEADER_TO_LINE
        .iter()
        .find(|(header, _)| *header == connector_pin)
        .map(|(_, line)| *line)
        .or_else(|| (connector_pin <= MAX_CHIP_LINE).then_some(connector_pin))
}

/// Resolve configured ports to chip lines, one slot per port.
///
/// A port that cannot be mapped, or that maps onto a line already taken by
/// an earlier port, resolves to `None` so the channel is left unclaimed.
pub fn resolve_ports(ports: &[u32], numbering: PinNumbering) -> Vec<Option<u32>> {
    let mut seen = HashSet::new();

    ports
        .iter()
        .map(|&port| {
            let line = match numbering {
                PinNumbering::Chip => Some(port),
                PinNumbering::Header => to_chip_pin(port),
            };

            match line {
                Some(line) if seen.insert(line) => Some(line),
                Some(line) => {
                    warn!(port, line, "Port maps onto a line already in use, leaving it unclaimed");
                    None
                }
                None => {
                    warn!(port, "Port does not map to a chip line");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_pins_translate() {
        assert_eq!(to_chip_pin(10), Some(15));
        assert_eq!(to_chip_pin(40), Some(21));
        assert_eq!(to_chip_pin(3), Some(2));
    }

    #[test]
    fn test_chip_lines_fall_through() {
        assert_eq!(to_chip_pin(0), Some(0));
        assert_eq!(to_chip_pin(6), Some(6));
        assert_eq!(to_chip_pin(27), Some(27));
    }

    #[test]
    fn test_out_of_range_is_unmapped() {
        assert_eq!(to_chip_pin(28), None);
        assert_eq!(to_chip_pin(39), None);
        assert_eq!(to_chip_pin(1000), None);
    }

    #[test]
    fn test_resolve_chip_numbering_is_identity() {
        let ports = [10, 12, 13, 40];
        assert_eq!(
            resolve_ports(&ports, PinNumbering::Chip),
            vec![Some(10), Some(12), Some(13), Some(40)]
        );
    }

    #[test]
    fn test_resolve_header_numbering_drops_collisions() {
        // header 22 and chip line 25 land on the same line
        let resolved = resolve_ports(&[22, 25, 39], PinNumbering::Header);
        assert_eq!(resolved, vec![Some(25), None, None]);
    }
}
