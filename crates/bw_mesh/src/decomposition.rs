// crates/bw_mesh/src/decomposition.rs

//! 笛卡尔区域分解
//!
//! 把全局 `NX × NY × NZ` 网格按 `px × py × pz` 拆给各 rank。
//! 拆分是确定性的：余数单元分给低编号分块。

use bw_foundation::{Box3, BwError, BwResult, Int3, Side};

/// 笛卡尔 rank 布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartDecomp {
    pub px: usize,
    pub py: usize,
    pub pz: usize,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl CartDecomp {
    pub fn new(px: usize, py: usize, pz: usize, nx: usize, ny: usize, nz: usize) -> BwResult<Self> {
        if px == 0 || py == 0 || pz == 0 {
            return Err(BwError::invalid_input("Decomposition needs at least one rank per axis"));
        }
        if px > nx || py > ny || pz > nz {
            return Err(BwError::invalid_input(format!(
                "Cannot split {nx}x{ny}x{nz} cells across {px}x{py}x{pz} ranks"
            )));
        }
        Ok(Self { px, py, pz, nx, ny, nz })
    }

    /// rank 总数
    pub fn num_ranks(&self) -> usize {
        self.px * self.py * self.pz
    }

    /// rank 的笛卡尔坐标 (pi, pj, pk)
    pub fn rank_coords(&self, rank: usize) -> (usize, usize, usize) {
        let pi = rank % self.px;
        let pj = (rank / self.px) % self.py;
        let pk = rank / (self.px * self.py);
        (pi, pj, pk)
    }

    /// 由笛卡尔坐标得到 rank
    pub fn rank_of(&self, pi: usize, pj: usize, pk: usize) -> usize {
        (pk * self.py + pj) * self.px + pi
    }

    /// rank 的内部索引盒 `[i0..imax) × [j0..jmax) × [k0..kmax)`
    pub fn interior_box(&self, rank: usize) -> Box3 {
        let (pi, pj, pk) = self.rank_coords(rank);
        let (i0, imax) = split_range(self.nx, self.px, pi);
        let (j0, jmax) = split_range(self.ny, self.py, pj);
        let (k0, kmax) = split_range(self.nz, self.pz, pk);
        Box3::new(
            Int3::new(i0 as i32, j0 as i32, k0 as i32),
            Int3::new(imax as i32, jmax as i32, kmax as i32),
        )
    }

    /// rank 的一层幽灵盒
    pub fn ghosted_box(&self, rank: usize) -> Box3 {
        self.interior_box(rank).grown(1)
    }

    /// 各面方向的邻居 rank（物理域边界处无邻居）
    pub fn neighbors(&self, rank: usize) -> [Option<usize>; 6] {
        let (pi, pj, pk) = self.rank_coords(rank);
        let mut out = [None; 6];
        for (n, side) in Side::ALL.iter().enumerate() {
            let (mut qi, mut qj, mut qk) = (pi as i64, pj as i64, pk as i64);
            match side {
                Side::XMin => qi -= 1,
                Side::XMax => qi += 1,
                Side::YMin => qj -= 1,
                Side::YMax => qj += 1,
                Side::ZMin => qk -= 1,
                Side::ZMax => qk += 1,
            }
            if qi >= 0
                && qi < self.px as i64
                && qj >= 0
                && qj < self.py as i64
                && qk >= 0
                && qk < self.pz as i64
            {
                out[n] = Some(self.rank_of(qi as usize, qj as usize, qk as usize));
            }
        }
        out
    }
}

/// 把 n 个单元拆成 p 份，第 r 份的半开区间
fn split_range(n: usize, p: usize, r: usize) -> (usize, usize) {
    let base = n / p;
    let rem = n % p;
    let lo = r * base + r.min(rem);
    let len = base + usize::from(r < rem);
    (lo, lo + len)
}
