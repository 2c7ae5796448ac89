//! Named rectangular regions in frame-relative percent coordinates.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    /// `[min, max]` in percent of frame width.
    pub x_range: [f64; 2],
    /// `[min, max]` in percent of frame height.
    pub y_range: [f64; 2],
}

impl Zone {
    pub fn new(name: impl Into<String>, x_range: [f64; 2], y_range: [f64; 2]) -> Self {
        Self {
            name: name.into(),
            x_range,
            y_range,
        }
    }

    /// Bounds are inclusive on both ends.
    pub fn contains(&self, x_pct: f64, y_pct: f64) -> bool {
        x_pct >= self.x_range[0]
            && x_pct <= self.x_range[1]
            && y_pct >= self.y_range[0]
            && y_pct <= self.y_range[1]
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("zone name must not be empty"));
        }
        for (axis, [min, max]) in [("x_range", self.x_range), ("y_range", self.y_range)] {
            if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) {
                return Err(anyhow!(
                    "zone '{}' {} must lie within [0, 100]",
                    self.name,
                    axis
                ));
            }
            if min >= max {
                return Err(anyhow!(
                    "zone '{}' {} min must be below max",
                    self.name,
                    axis
                ));
            }
        }
        Ok(())
    }
}

/// Ordered zone table. The first matching zone wins.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneTable {
    zones: Vec<Zone>,
}

impl ZoneTable {
    pub fn new(zones: Vec<Zone>) -> Result<Self> {
        for zone in &zones {
            zone.validate()?;
        }
        Ok(Self { zones })
    }

    /// 3x3 grid: `top-left`, `top-center`, ... `bottom-right`.
    pub fn default_grid() -> Self {
        const ROWS: [&str; 3] = ["top", "middle", "bottom"];
        const COLS: [&str; 3] = ["left", "center", "right"];
        let third = 100.0 / 3.0;
        let mut zones = Vec::with_capacity(9);
        for (row, row_name) in ROWS.iter().enumerate() {
            for (col, col_name) in COLS.iter().enumerate() {
                zones.push(Zone::new(
                    format!("{}-{}", row_name, col_name),
                    [col as f64 * third, (col + 1) as f64 * third],
                    [row as f64 * third, (row + 1) as f64 * third],
                ));
            }
        }
        Self { zones }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn classify(&self, x_pct: f64, y_pct: f64) -> Option<&str> {
        self.zones
            .iter()
            .find(|zone| zone.contains(x_pct, y_pct))
            .map(|zone| zone.name.as_str())
    }
}

impl Default for ZoneTable {
    fn default() -> Self {
        Self::default_grid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_classifies_corners_and_center() {
        let table = ZoneTable::default_grid();
        assert_eq!(table.zones().len(), 9);
        assert_eq!(table.classify(5.0, 5.0), Some("top-left"));
        assert_eq!(table.classify(50.0, 50.0), Some("middle-center"));
        assert_eq!(table.classify(100.0, 100.0), Some("bottom-right"));
        assert_eq!(table.classify(90.0, 10.0), Some("top-right"));
    }

    #[test]
    fn first_match_wins_and_misses_are_none() -> Result<()> {
        let table = ZoneTable::new(vec![
            Zone::new("door", [0.0, 50.0], [0.0, 100.0]),
            Zone::new("left-half", [0.0, 50.0], [0.0, 100.0]),
        ])?;
        assert_eq!(table.classify(10.0, 10.0), Some("door"));
        assert_eq!(table.classify(75.0, 10.0), None);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_or_inverted_zones() {
        assert!(ZoneTable::new(vec![Zone::new("a", [0.0, 120.0], [0.0, 10.0])]).is_err());
        assert!(ZoneTable::new(vec![Zone::new("a", [50.0, 10.0], [0.0, 10.0])]).is_err());
        assert!(ZoneTable::new(vec![Zone::new(" ", [0.0, 10.0], [0.0, 10.0])]).is_err());
    }
}
