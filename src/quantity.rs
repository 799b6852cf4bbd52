//! Quantity formatting for item counts.
//!
//! Counts are always stored as plain integers; units only change how they are
//! rendered. A stack holds `stack_size` items and a container holds
//! `container_slots` stacks.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

pub const DEFAULT_STACK_SIZE: u32 = 64;
pub const DEFAULT_CONTAINER_SLOTS: u32 = 27;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Unit {
    #[default]
    Item,
    Stack,
    Container,
}

impl Unit {
    /// Next unit in display order, wrapping back to `Item`.
    pub fn cycle(self) -> Self {
        let mut units = Unit::iter().cycle();
        units.find(|unit| *unit == self);
        units.next().unwrap_or(Unit::Item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackGeometry {
    stack_size: u32,
    container_slots: u32,
}

impl StackGeometry {
    pub fn new(stack_size: u32, container_slots: u32) -> Self {
        Self {
            stack_size: stack_size.max(1),
            container_slots: container_slots.max(1),
        }
    }

    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }

    pub fn container_slots(&self) -> u32 {
        self.container_slots
    }

    pub fn container_capacity(&self) -> i64 {
        i64::from(self.stack_size) * i64::from(self.container_slots)
    }
}

impl Default for StackGeometry {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_SIZE, DEFAULT_CONTAINER_SLOTS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Breakdown {
    pub containers: i64,
    pub stacks: i64,
    pub items: i64,
}

impl Breakdown {
    pub fn decompose(value: i64, geometry: StackGeometry) -> Self {
        let stack = i64::from(geometry.stack_size);
        let capacity = geometry.container_capacity();
        let containers = value.div_euclid(capacity);
        let rest = value.rem_euclid(capacity);
        Self {
            containers,
            stacks: rest / stack,
            items: rest % stack,
        }
    }

    pub fn total(&self, geometry: StackGeometry) -> i64 {
        self.containers * geometry.container_capacity()
            + self.stacks * i64::from(geometry.stack_size)
            + self.items
    }
}

pub fn format_quantity(value: i64, unit: Unit, geometry: StackGeometry) -> String {
    if unit == Unit::Item || value == 0 {
        return value.to_string();
    }

    match unit {
        Unit::Item => value.to_string(),
        Unit::Stack => {
            let stack = i64::from(geometry.stack_size);
            let stacks = value.div_euclid(stack);
            let items = value.rem_euclid(stack);
            if items == 0 {
                format!("{stacks} stacks")
            } else if stacks == 0 {
                format!("{items} items")
            } else {
                format!("{stacks} stacks {items} items")
            }
        }
        Unit::Container => {
            let parts = Breakdown::decompose(value, geometry);
            let mut rendered = Vec::with_capacity(3);
            if parts.containers != 0 {
                rendered.push(format!("{} containers", parts.containers));
            }
            if parts.stacks != 0 {
                rendered.push(format!("{} stacks", parts.stacks));
            }
            if parts.items != 0 {
                rendered.push(format!("{} items", parts.items));
            }
            if rendered.is_empty() {
                return "0".to_string();
            }
            rendered.join(" ")
        }
    }
}

/// Formats text that should hold a count. Anything that does not parse as an
/// integer comes back verbatim.
pub fn format_raw(raw: &str, unit: Unit, geometry: StackGeometry) -> String {
    match raw.trim().parse::<i64>() {
        Ok(value) => format_quantity(value, unit, geometry),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> StackGeometry {
        StackGeometry::default()
    }

    #[test]
    fn zero_renders_as_plain_zero_for_every_unit() {
        for unit in Unit::iter() {
            assert_eq!(format_quantity(0, unit, geometry()), "0", "unit {unit}");
        }
    }

    #[test]
    fn item_unit_is_plain_integer() {
        assert_eq!(format_quantity(1234, Unit::Item, geometry()), "1234");
    }

    #[test]
    fn stack_unit_omits_empty_parts() {
        assert_eq!(format_quantity(128, Unit::Stack, geometry()), "2 stacks");
        assert_eq!(format_quantity(10, Unit::Stack, geometry()), "10 items");
        assert_eq!(
            format_quantity(130, Unit::Stack, geometry()),
            "2 stacks 2 items"
        );
    }

    #[test]
    fn container_unit_lists_only_non_zero_parts() {
        assert_eq!(
            format_quantity(1728, Unit::Container, geometry()),
            "1 containers"
        );
        assert_eq!(
            format_quantity(1728 + 5, Unit::Container, geometry()),
            "1 containers 5 items"
        );
        assert_eq!(
            format_quantity(2 * 1728 + 3 * 64 + 1, Unit::Container, geometry()),
            "2 containers 3 stacks 1 items"
        );
        assert_eq!(format_quantity(64, Unit::Container, geometry()), "1 stacks");
    }

    #[test]
    fn container_breakdown_reconstructs_every_value() {
        let geometry = geometry();
        assert_eq!(geometry.container_capacity(), 1728);
        for value in 0..=10_000 {
            let parts = Breakdown::decompose(value, geometry);
            assert!(parts.stacks < 27 && parts.items < 64);
            assert_eq!(parts.total(geometry), value);
        }
    }

    #[test]
    fn custom_geometry_is_respected() {
        let geometry = StackGeometry::new(16, 9);
        assert_eq!(format_quantity(33, Unit::Stack, geometry), "2 stacks 1 items");
        assert_eq!(
            format_quantity(144 + 16, Unit::Container, geometry),
            "1 containers 1 stacks"
        );
    }

    #[test]
    fn zero_geometry_is_clamped() {
        let geometry = StackGeometry::new(0, 0);
        assert_eq!(geometry.stack_size(), 1);
        assert_eq!(format_quantity(3, Unit::Stack, geometry), "3 stacks");
    }

    #[test]
    fn unparsable_raw_text_is_returned_verbatim() {
        assert_eq!(format_raw("n/a", Unit::Stack, geometry()), "n/a");
        assert_eq!(format_raw(" 64 ", Unit::Stack, geometry()), "1 stacks");
    }

    #[test]
    fn negative_values_do_not_panic() {
        let rendered = format_quantity(-1, Unit::Container, geometry());
        assert!(!rendered.is_empty());
    }

    #[test]
    fn unit_cycles_and_parses() {
        assert_eq!(Unit::Item.cycle(), Unit::Stack);
        assert_eq!(Unit::Stack.cycle(), Unit::Container);
        assert_eq!(Unit::Container.cycle(), Unit::Item);
        assert_eq!("Stack".parse::<Unit>().ok(), Some(Unit::Stack));
        assert_eq!(Unit::Container.to_string(), "container");
    }
}
