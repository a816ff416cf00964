//! # Fixture Grid Tests
//!
//! Every scenario runs against pools sized `size * count` for a grid of
//! element sizes and counts, mixing raw "dummy" blocks of `size` bytes
//! with a 24-byte three-field record placed through the typed layer.
//!
//! Dummies are filled with `0x5a` on creation and `0xa5` right before
//! release, so any block that is moved without its bytes, or overlaps a
//! neighbour, shows up as a failed check.
//!
//! Run with: cargo test --test fixture_grid

use bytemuck::{Pod, Zeroable};
use mosaic_core::{PoolAllocator, PoolError, PoolHandle, PoolResult, TypedHandle};

const LIVE: u8 = 0x5a;
const DEAD: u8 = 0xa5;

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Complex {
    a: i64,
    b: u64,
    c: f64,
}

const COMPLEX_SIZE: usize = std::mem::size_of::<Complex>();

struct Fixture {
    pool: PoolAllocator,
    size: usize,
    count: usize,
}

impl Fixture {
    fn new(size: usize, count: usize) -> Self {
        Self {
            pool: PoolAllocator::new(size * count),
            size,
            count,
        }
    }

    fn pool_size(&self) -> usize {
        self.size * self.count
    }

    fn create_dummy(&mut self) -> PoolResult<PoolHandle> {
        let h = self.pool.allocate(self.size)?;
        self.pool.bytes_mut(h)?.fill(LIVE);
        Ok(h)
    }

    fn set_first(&mut self, h: PoolHandle, value: u8) {
        self.pool.bytes_mut(h).unwrap()[0] = value;
    }

    fn first(&self, h: PoolHandle) -> u8 {
        self.pool.bytes(h).unwrap()[0]
    }

    fn check_dummy(&self, h: PoolHandle) -> bool {
        self.pool.bytes(h).unwrap().iter().all(|&b| b == LIVE)
    }

    fn destroy_dummy(&mut self, h: PoolHandle) {
        if !h.is_null() {
            self.pool.bytes_mut(h).unwrap().fill(DEAD);
        }
        self.pool.deallocate(h).unwrap();
    }

    fn create_complex(&mut self, a: i64, b: char, c: f64) -> PoolResult<TypedHandle<Complex>> {
        self.pool.emplace(Complex {
            a,
            b: u64::from(b),
            c,
        })
    }

    fn destroy_complex(&mut self, h: Option<TypedHandle<Complex>>) {
        if let Some(h) = h {
            let mut value = self.pool.read(h).unwrap();
            value.a = -1;
            self.pool.write(h, value).unwrap();
            self.pool.deallocate(h.into_raw()).unwrap();
        }
    }

    fn assert_complex(&self, h: TypedHandle<Complex>, a: i64, b: char, c: f64) {
        let value = self.pool.read(h).unwrap();
        assert_eq!(value.a, a);
        assert_eq!(value.b, u64::from(b));
        assert!((value.c - c).abs() < f64::EPSILON);
    }
}

fn is_oom<T>(result: &PoolResult<T>) -> bool {
    matches!(result, Err(PoolError::OutOfMemory { .. }))
}

fn single_dummy(size: usize, count: usize) {
    let mut f = Fixture::new(size, count);
    let h = f.create_dummy().unwrap();
    f.set_first(h, 112);
    assert_eq!(f.first(h), 112);
    f.destroy_dummy(h);
    assert_eq!(f.pool.live_count(), 0);
}

fn single_complex(size: usize, count: usize) {
    let mut f = Fixture::new(size, count);
    if f.pool_size() >= COMPLEX_SIZE {
        let h = f.create_complex(-511, '@', 0.05).unwrap();
        f.assert_complex(h, -511, '@', 0.05);
        f.destroy_complex(Some(h));
    } else {
        assert!(is_oom(&f.create_complex(0, '@', 0.01)));
    }
}

fn full_dummy(size: usize, count: usize) {
    let mut f = Fixture::new(size, count);
    let mut handles = Vec::new();
    for _ in 0..count {
        let h = f.create_dummy().unwrap();
        f.set_first(h, 199);
        handles.push(h);
    }
    assert!(is_oom(&f.create_dummy()));
    assert!(is_oom(&f.create_dummy()));

    for h in handles {
        assert_eq!(f.first(h), 199);
        f.destroy_dummy(h);
    }
    let h = f.create_dummy().unwrap();
    f.destroy_dummy(h);
    f.pool.validate().unwrap();
}

fn full_complex(size: usize, count: usize) {
    let mut f = Fixture::new(size, count);
    let complex_count = f.pool_size() / COMPLEX_SIZE;
    let d = 1.11e-3;
    let mut handles = Vec::new();
    for n in 0..complex_count {
        let a = -11 - n as i64;
        let h = f.create_complex(a, 'X', d).unwrap();
        f.assert_complex(h, a, 'X', d);
        handles.push(h);
    }
    if f.pool_size() >= COMPLEX_SIZE {
        assert!(is_oom(&f.create_complex(0, 'X', 0.01)));
    }

    for (n, h) in handles.into_iter().enumerate() {
        f.assert_complex(h, -11 - n as i64, 'X', d);
        f.destroy_complex(Some(h));
    }
    if f.pool_size() >= COMPLEX_SIZE {
        let h = f.create_complex(0, 'X', 0.01).unwrap();
        f.destroy_complex(Some(h));
    }
    f.pool.validate().unwrap();
}

fn full_mixed(size: usize, count: usize) {
    let mut f = Fixture::new(size, count);
    let (a, b, c, u) = (-113, '7', 100.99, 0x1f);
    let mut dummies = Vec::new();
    let mut complexes = Vec::new();
    let mut available = f.pool_size();

    while available >= size || available >= COMPLEX_SIZE {
        if available >= COMPLEX_SIZE {
            complexes.push(f.create_complex(a, b, c).unwrap());
            available -= COMPLEX_SIZE;
        }
        if available >= size {
            let h = f.create_dummy().unwrap();
            f.set_first(h, u);
            dummies.push(h);
            available -= size;
        }
    }
    assert!(available < size && available < COMPLEX_SIZE);
    assert_eq!(f.pool.free_bytes(), available);
    assert!(is_oom(&f.create_dummy()));
    if f.pool_size() >= COMPLEX_SIZE {
        assert!(is_oom(&f.create_complex(0, b, 0.01)));
    }

    for h in complexes {
        f.assert_complex(h, a, b, c);
        f.destroy_complex(Some(h));
    }
    for h in dummies {
        assert_eq!(f.first(h), u);
        f.destroy_dummy(h);
    }
    assert_eq!(f.pool.free_bytes(), f.pool_size());
}

fn dummy_fragmentation(size: usize, count: usize) {
    let mut f = Fixture::new(size, count);
    let mut dummies: Vec<PoolHandle> = (0..count).map(|_| f.create_dummy().unwrap()).collect();

    let mut available = 0;
    for i in (0..count).step_by(2) {
        f.destroy_dummy(dummies[i]);
        dummies[i] = PoolHandle::NULL;
        available += size;
    }

    let (b, c) = (' ', 16_320.0);
    let mut complexes = Vec::new();
    let mut n = 0;
    while available >= 2 * COMPLEX_SIZE {
        complexes.push(f.create_complex(n, b, c).unwrap());
        n += 1;
        available -= COMPLEX_SIZE;
    }

    for h in dummies {
        if !h.is_null() {
            assert!(f.check_dummy(h));
        }
        f.destroy_dummy(h);
    }
    for (n, h) in complexes.into_iter().enumerate() {
        f.assert_complex(h, n as i64, b, c);
        f.destroy_complex(Some(h));
    }
    f.pool.validate().unwrap();
}

fn complex_fragmentation(size: usize, count: usize) {
    let mut f = Fixture::new(size, count);
    let complex_num = f.pool_size() / COMPLEX_SIZE;
    let (b, c) = (' ', 16_320.0);
    let mut complexes: Vec<Option<TypedHandle<Complex>>> = (0..complex_num)
        .map(|n| Some(f.create_complex(n as i64, b, c).unwrap()))
        .collect();

    let mut available = 0;
    for i in (0..complex_num).step_by(2) {
        f.destroy_complex(complexes[i].take());
        available += COMPLEX_SIZE;
    }

    let mut dummies = Vec::new();
    while available >= 2 * size {
        dummies.push(f.create_dummy().unwrap());
        available -= size;
    }

    for (n, h) in complexes.into_iter().enumerate() {
        if let Some(h) = h {
            f.assert_complex(h, n as i64, b, c);
        }
        f.destroy_complex(h);
    }
    for h in dummies {
        assert!(f.check_dummy(h));
        f.destroy_dummy(h);
    }
    f.pool.validate().unwrap();
}

macro_rules! fixture_suite {
    ($($name:ident: ($size:expr, $count:expr),)*) => {
        $(
            mod $name {
                #[test]
                fn single_dummy() {
                    super::single_dummy($size, $count);
                }

                #[test]
                fn single_complex() {
                    super::single_complex($size, $count);
                }

                #[test]
                fn full_dummy() {
                    super::full_dummy($size, $count);
                }

                #[test]
                fn full_complex() {
                    super::full_complex($size, $count);
                }

                #[test]
                fn full_mixed() {
                    super::full_mixed($size, $count);
                }

                #[test]
                fn dummy_fragmentation() {
                    super::dummy_fragmentation($size, $count);
                }

                #[test]
                fn complex_fragmentation() {
                    super::complex_fragmentation($size, $count);
                }
            }
        )*
    };
}

fixture_suite! {
    size1_count1: (1, 1),
    size1_count24: (1, 24),
    size3_count1: (3, 1),
    size7_count4: (7, 4),
    size7_count15: (7, 15),
    size10_count10: (10, 10),
    size256_count1: (256, 1),
    size256_count256: (256, 256),
}
