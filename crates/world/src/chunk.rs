use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Chunk {
    pub cx: i64,
    pub cy: i64,
}

impl Chunk {
    pub fn new(cx: i64, cy: i64) -> Self {
        Self { cx, cy }
    }

    pub fn key(&self) -> String {
        format!("{}_{}", self.cx, self.cy)
    }

    pub fn parse_key(key: &str) -> Option<Self> {
        let (cx, cy) = key.split_once('_')?;
        Some(Self {
            cx: cx.parse().ok()?,
            cy: cy.parse().ok()?,
        })
    }
}

pub fn chunk_of(x: f64, y: f64, size: f64) -> Chunk {
    let size = if size.is_finite() && size > 0.0 { size } else { 1.0 };
    Chunk {
        cx: floor_div(x, size),
        cy: floor_div(y, size),
    }
}

fn floor_div(value: f64, size: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    (value / size).floor() as i64
}

// The (2r+1)² window centred on `chunk`. Rows and columns that would fall
// past the i64 range are cut off, so the window shrinks at the edge.
pub fn neighbors(chunk: Chunk, radius: u32) -> Vec<Chunk> {
    let r = i64::from(radius);
    let side = 2 * radius as usize + 1;
    let mut out = Vec::with_capacity(side * side);
    for dy in -r..=r {
        let Some(cy) = chunk.cy.checked_add(dy) else {
            continue;
        };
        for dx in -r..=r {
            if let Some(cx) = chunk.cx.checked_add(dx) {
                out.push(Chunk { cx, cy });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn floor_division_handles_negatives() {
        assert_eq!(chunk_of(0.0, 0.0, 100.0), Chunk::new(0, 0));
        assert_eq!(chunk_of(99.9, 100.0, 100.0), Chunk::new(0, 1));
        assert_eq!(chunk_of(-0.5, -100.0, 100.0), Chunk::new(-1, -1));
        assert_eq!(chunk_of(-100.5, 250.0, 100.0), Chunk::new(-2, 2));
    }

    #[test]
    fn degenerate_inputs_do_not_panic() {
        assert_eq!(chunk_of(f64::NAN, f64::INFINITY, 100.0), Chunk::new(0, 0));
        assert_eq!(chunk_of(5.5, -2.5, 0.0), Chunk::new(5, -3));
        assert_eq!(chunk_of(5.5, -2.5, f64::NAN), Chunk::new(5, -3));
    }

    #[test]
    fn radius_zero_is_the_chunk_itself() {
        let chunk = Chunk::new(4, -7);
        assert_eq!(neighbors(chunk, 0), vec![chunk]);
    }

    #[test]
    fn window_moves_with_the_centre() {
        let before: HashSet<_> = neighbors(Chunk::new(0, 0), 2).into_iter().collect();
        let after: HashSet<_> = neighbors(Chunk::new(3, 0), 2).into_iter().collect();
        let kept = before.intersection(&after).count();
        assert_eq!(kept, 2 * 5);
        assert!(after.contains(&Chunk::new(5, 2)));
        assert!(!after.contains(&Chunk::new(0, 0)));
    }

    #[test]
    fn window_is_cut_at_the_coordinate_edge() {
        let edge = chunk_of(1.0e300, 0.0, 100.0);
        assert_eq!(edge.cx, i64::MAX);

        let window = neighbors(edge, 1);
        let unique: HashSet<_> = window.iter().copied().collect();
        assert_eq!(window.len(), 6);
        assert_eq!(unique.len(), window.len());
        assert!(window.contains(&edge));
        assert!(window.iter().all(|c| c.cx >= i64::MAX - 1));

        let corner = Chunk::new(i64::MIN, i64::MIN);
        assert_eq!(neighbors(corner, 2).len(), 9);
    }

    #[test]
    fn key_round_trips_negative_coordinates() {
        let chunk = Chunk::new(-12, 3);
        assert_eq!(chunk.key(), "-12_3");
        assert_eq!(Chunk::parse_key("-12_3"), Some(chunk));
        assert_eq!(Chunk::parse_key("-12"), None);
        assert_eq!(Chunk::parse_key("a_b"), None);
    }

    proptest! {
        #[test]
        fn own_chunk_is_always_a_neighbor(
            x in -1.0e7f64..1.0e7,
            y in -1.0e7f64..1.0e7,
            size in 1.0f64..2048.0,
            radius in 0u32..6,
        ) {
            let chunk = chunk_of(x, y, size);
            prop_assert!(neighbors(chunk, radius).contains(&chunk));
        }

        #[test]
        fn window_size_is_square_of_diameter(
            cx in -10_000i64..10_000,
            cy in -10_000i64..10_000,
            radius in 0u32..8,
        ) {
            let window = neighbors(Chunk::new(cx, cy), radius);
            let side = (2 * radius + 1) as usize;
            let unique: HashSet<_> = window.iter().copied().collect();
            prop_assert_eq!(window.len(), side * side);
            prop_assert_eq!(unique.len(), side * side);
        }
    }
}
