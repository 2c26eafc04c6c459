//! Seeded generator reproducing numpy's `default_rng(seed)`.
//!
//! Sampled circuits produced by earlier deployments are addressed by seed, so
//! the same `(population, ratio, seed)` must keep selecting the same ids. The
//! stream is `SeedSequence` -> `PCG64` (XSL-RR 128/64) and bounded integers
//! use Lemire's method with 32-bit buffering, matching
//! `Generator.choice(n, k, replace=False, shuffle=False)`.

use rand::RngCore;

const POOL_SIZE: usize = 4;
const INIT_A: u32 = 0x43b0_d7e5;
const MULT_A: u32 = 0x931e_8875;
const INIT_B: u32 = 0x8b51_f9dd;
const MULT_B: u32 = 0x58f3_8ded;
const MIX_MULT_L: u32 = 0xca01_f9dd;
const MIX_MULT_R: u32 = 0x4973_f715;
const XSHIFT: u32 = 16;

const PCG_MULTIPLIER: u128 = 0x2360_ed05_1fc6_5da4_4385_df64_9fcc_f645;

/// Entropy pool expanding a seed into generator state words.
#[derive(Clone, Debug)]
pub struct SeedSequence {
    pool: [u32; POOL_SIZE],
}

impl SeedSequence {
    /// Mixes a 64-bit seed into the pool.
    pub fn new(seed: u64) -> Self {
        let mut entropy = Vec::with_capacity(2);
        let mut rest = seed;
        while rest > 0 {
            entropy.push(rest as u32);
            rest >>= 32;
        }
        if entropy.is_empty() {
            entropy.push(0);
        }

        let mut hash_const = INIT_A;
        let mut hashmix = |value: u32| -> u32 {
            let mut value = value ^ hash_const;
            hash_const = hash_const.wrapping_mul(MULT_A);
            value = value.wrapping_mul(hash_const);
            value ^ (value >> XSHIFT)
        };

        let mut pool = [0u32; POOL_SIZE];
        for (i, slot) in pool.iter_mut().enumerate() {
            *slot = hashmix(entropy.get(i).copied().unwrap_or(0));
        }
        for src in 0..POOL_SIZE {
            for dst in 0..POOL_SIZE {
                if src != dst {
                    let hashed = hashmix(pool[src]);
                    pool[dst] = mix(pool[dst], hashed);
                }
            }
        }
        for &word in entropy.iter().skip(POOL_SIZE) {
            for dst in 0..POOL_SIZE {
                let hashed = hashmix(word);
                pool[dst] = mix(pool[dst], hashed);
            }
        }
        Self { pool }
    }

    /// Produces `count` 64-bit state words.
    pub fn generate_state(&self, count: usize) -> Vec<u64> {
        let mut hash_const = INIT_B;
        let mut words = (0..count * 2).map(|i| {
            let mut value = self.pool[i % POOL_SIZE] ^ hash_const;
            hash_const = hash_const.wrapping_mul(MULT_B);
            value = value.wrapping_mul(hash_const);
            value ^ (value >> XSHIFT)
        });
        let mut state = Vec::with_capacity(count);
        while let (Some(lo), Some(hi)) = (words.next(), words.next()) {
            state.push(u64::from(lo) | (u64::from(hi) << 32));
        }
        state
    }
}

fn mix(x: u32, y: u32) -> u32 {
    let result = MIX_MULT_L
        .wrapping_mul(x)
        .wrapping_sub(MIX_MULT_R.wrapping_mul(y));
    result ^ (result >> XSHIFT)
}

/// PCG64 with numpy's 32-bit output buffering.
#[derive(Clone, Debug)]
pub struct Pcg64 {
    state: u128,
    increment: u128,
    buffered: Option<u32>,
}

impl Pcg64 {
    /// Generator equivalent to `numpy.random.default_rng(seed)`.
    pub fn from_seed(seed: u64) -> Self {
        let words = SeedSequence::new(seed).generate_state(4);
        let initial = (u128::from(words[0]) << 64) | u128::from(words[1]);
        let stream = (u128::from(words[2]) << 64) | u128::from(words[3]);
        Self::new(initial, stream)
    }

    /// Generator with explicit initial state and stream.
    pub fn new(initial: u128, stream: u128) -> Self {
        let mut rng = Self {
            state: 0,
            increment: (stream << 1) | 1,
            buffered: None,
        };
        rng.step();
        rng.state = rng.state.wrapping_add(initial);
        rng.step();
        rng
    }

    fn step(&mut self) {
        self.state = self
            .state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.increment);
    }

    /// Uniform integer in `0..=max`.
    pub fn bounded(&mut self, max: u64) -> u64 {
        if max == 0 {
            0
        } else if max == u64::from(u32::MAX) {
            u64::from(self.next_u32())
        } else if max < u64::from(u32::MAX) {
            u64::from(self.lemire32(max as u32))
        } else if max == u64::MAX {
            self.next_u64()
        } else {
            self.lemire64(max)
        }
    }

    fn lemire32(&mut self, max: u32) -> u32 {
        let span = u64::from(max) + 1;
        let mut product = u64::from(self.next_u32()) * span;
        let mut leftover = product & u64::from(u32::MAX);
        if leftover < span {
            let threshold = (u64::from(u32::MAX) - u64::from(max)) % span;
            while leftover < threshold {
                product = u64::from(self.next_u32()) * span;
                leftover = product & u64::from(u32::MAX);
            }
        }
        (product >> 32) as u32
    }

    fn lemire64(&mut self, max: u64) -> u64 {
        let span = u128::from(max) + 1;
        let mut product = u128::from(self.next_u64()) * span;
        let mut leftover = product & u128::from(u64::MAX);
        if leftover < span {
            let threshold = (u128::from(u64::MAX) - u128::from(max)) % span;
            while leftover < threshold {
                product = u128::from(self.next_u64()) * span;
                leftover = product & u128::from(u64::MAX);
            }
        }
        (product >> 64) as u64
    }
}

impl RngCore for Pcg64 {
    fn next_u32(&mut self) -> u32 {
        if let Some(high) = self.buffered.take() {
            return high;
        }
        let word = self.next_u64();
        self.buffered = Some((word >> 32) as u32);
        word as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.step();
        let rotation = (self.state >> 122) as u32;
        let folded = ((self.state >> 64) as u64) ^ (self.state as u64);
        folded.rotate_right(rotation)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Draws `count` distinct positions out of `0..population`, in draw order.
///
/// Mirrors numpy's non-shuffled choice: Floyd's algorithm with an open
/// addressing set, or a partial Fisher-Yates over the tail for large dense
/// draws.
pub fn choice_without_replacement(rng: &mut Pcg64, population: usize, count: usize) -> Vec<usize> {
    let count = count.min(population);
    if population > 10_000 && count > population / 20 {
        return tail_shuffle(rng, population, count);
    }
    floyd(rng, population, count)
}

fn floyd(rng: &mut Pcg64, population: usize, count: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    let set_size = (1.2 * count as f64) as u64;
    let mut mask = set_size;
    for shift in [1, 2, 4, 8, 16, 32] {
        mask |= mask >> shift;
    }
    let mut slots: Vec<Option<u64>> = vec![None; (mask + 1) as usize];
    let mut picked = Vec::with_capacity(count);
    for j in (population - count)..population {
        let j = j as u64;
        let value = rng.bounded(j);
        let mut loc = value & mask;
        while let Some(existing) = slots[loc as usize] {
            if existing == value {
                break;
            }
            loc = (loc + 1) & mask;
        }
        if slots[loc as usize].is_none() {
            slots[loc as usize] = Some(value);
            picked.push(value as usize);
        } else {
            let mut loc = j & mask;
            while slots[loc as usize].is_some() {
                loc = (loc + 1) & mask;
            }
            slots[loc as usize] = Some(j);
            picked.push(j as usize);
        }
    }
    picked
}

fn tail_shuffle(rng: &mut Pcg64, population: usize, count: usize) -> Vec<usize> {
    let mut ids: Vec<usize> = (0..population).collect();
    let first = (population - count).max(1);
    for i in (first..population).rev() {
        let j = rng.bounded(i as u64) as usize;
        ids.swap(i, j);
    }
    ids.split_off(population - count)
}
