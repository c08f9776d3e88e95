//! Gray-code Sobol' sequence generator for up to three dimensions.
//!
//! Direction numbers are those of Joe and Kuo for the second and third
//! dimensions; the first dimension is the van der Corput sequence.

const BITS: usize = 32;
const SCALE: f64 = 1.0 / 4_294_967_296.0;

/// `(degree s, coefficients a, initial direction numbers m)` per dimension.
const PRIMITIVES: [(usize, u32, &[u32]); 3] = [(0, 0, &[]), (1, 0, &[1]), (2, 1, &[1, 3])];

pub const MAX_DIMENSIONS: usize = PRIMITIVES.len();

pub struct Sobol {
    directions: Vec<[u32; BITS]>,
    state: Vec<u32>,
    counter: u32,
}

impl Sobol {
    /// `dimensions` is clamped into `1..=MAX_DIMENSIONS`.
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.clamp(1, MAX_DIMENSIONS);
        let directions = PRIMITIVES[..dimensions]
            .iter()
            .map(|&(s, a, m)| direction_numbers(s, a, m))
            .collect();
        Self {
            directions,
            state: vec![0; dimensions],
            counter: 0,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.state.len()
    }

    /// The next point in the unit cube. The all-zero first point is skipped.
    pub fn next_point(&mut self) -> Vec<f64> {
        let bit = self.counter.trailing_ones() as usize % BITS;
        for (x, directions) in self.state.iter_mut().zip(&self.directions) {
            *x ^= directions[bit];
        }
        self.counter = self.counter.wrapping_add(1);
        self.state.iter().map(|&x| x as f64 * SCALE).collect()
    }
}

fn direction_numbers(s: usize, a: u32, m: &[u32]) -> [u32; BITS] {
    let mut v = [0u32; BITS];
    if s == 0 {
        for (k, value) in v.iter_mut().enumerate() {
            *value = 1 << (BITS - 1 - k);
        }
        return v;
    }

    for k in 0..BITS {
        if k < s {
            v[k] = m[k] << (BITS - 1 - k);
        } else {
            let mut value = v[k - s] ^ (v[k - s] >> s);
            for j in 1..s {
                if (a >> (s - 1 - j)) & 1 == 1 {
                    value ^= v[k - j];
                }
            }
            v[k] = value;
        }
    }
    v
}
