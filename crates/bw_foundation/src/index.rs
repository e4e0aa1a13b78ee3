// crates/bw_foundation/src/index.rs

//! 网格索引类型
//!
//! 结构化网格使用带符号的整型索引：外层幽灵单元可以取到 -1 与 N。
//! - [`Int3`]: 三维单元索引
//! - [`Box3`]: 半开索引盒 `[lo, hi)`
//! - [`Axis`] / [`Side`]: 轴与面方位枚举

use std::fmt;

/// 三维单元索引 (i, j, k)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Int3 {
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl Int3 {
    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    /// 沿某轴的偏移
    pub fn offset(self, axis: Axis, d: i32) -> Self {
        match axis {
            Axis::X => Self::new(self.i + d, self.j, self.k),
            Axis::Y => Self::new(self.i, self.j + d, self.k),
            Axis::Z => Self::new(self.i, self.j, self.k + d),
        }
    }

    /// 六个轴向邻居，顺序为 -x, +x, -y, +y, -z, +z
    pub fn axis_neighbors(self) -> [Int3; 6] {
        [
            Self::new(self.i - 1, self.j, self.k),
            Self::new(self.i + 1, self.j, self.k),
            Self::new(self.i, self.j - 1, self.k),
            Self::new(self.i, self.j + 1, self.k),
            Self::new(self.i, self.j, self.k - 1),
            Self::new(self.i, self.j, self.k + 1),
        ]
    }
}

impl fmt::Display for Int3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.i, self.j, self.k)
    }
}

impl From<(i32, i32, i32)> for Int3 {
    fn from(t: (i32, i32, i32)) -> Self {
        Self::new(t.0, t.1, t.2)
    }
}

/// 坐标轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// 轴编号 (x=0, y=1, z=2)
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// 物理域的六个面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// x 负方向 (left)
    XMin,
    /// x 正方向 (right)
    XMax,
    /// y 负方向 (bottom)
    YMin,
    /// y 正方向 (top)
    YMax,
    /// z 负方向 (back)
    ZMin,
    /// z 正方向 (front)
    ZMax,
}

impl Side {
    pub const ALL: [Side; 6] = [
        Side::XMin,
        Side::XMax,
        Side::YMin,
        Side::YMax,
        Side::ZMin,
        Side::ZMax,
    ];

    /// 所在轴
    pub fn axis(self) -> Axis {
        match self {
            Side::XMin | Side::XMax => Axis::X,
            Side::YMin | Side::YMax => Axis::Y,
            Side::ZMin | Side::ZMax => Axis::Z,
        }
    }

    /// 外法向符号 (-1 或 +1)
    pub fn sign(self) -> i32 {
        match self {
            Side::XMin | Side::YMin | Side::ZMin => -1,
            Side::XMax | Side::YMax | Side::ZMax => 1,
        }
    }
}

/// 半开索引盒 `[lo, hi)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Box3 {
    pub lo: Int3,
    pub hi: Int3,
}

impl Box3 {
    pub fn new(lo: Int3, hi: Int3) -> Self {
        Self { lo, hi }
    }

    /// 单个单元的索引盒 `[p, p+1)`
    pub fn cell(p: Int3) -> Self {
        Self::new(p, Int3::new(p.i + 1, p.j + 1, p.k + 1))
    }

    /// 各方向长度
    pub fn extent(&self) -> (usize, usize, usize) {
        (
            (self.hi.i - self.lo.i).max(0) as usize,
            (self.hi.j - self.lo.j).max(0) as usize,
            (self.hi.k - self.lo.k).max(0) as usize,
        )
    }

    /// 单元总数
    pub fn len(&self) -> usize {
        let (ni, nj, nk) = self.extent();
        ni * nj * nk
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 是否包含索引
    pub fn contains(&self, p: Int3) -> bool {
        p.i >= self.lo.i
            && p.i < self.hi.i
            && p.j >= self.lo.j
            && p.j < self.hi.j
            && p.k >= self.lo.k
            && p.k < self.hi.k
    }

    /// 向外扩张 n 层
    pub fn grown(&self, n: i32) -> Self {
        Self::new(
            Int3::new(self.lo.i - n, self.lo.j - n, self.lo.k - n),
            Int3::new(self.hi.i + n, self.hi.j + n, self.hi.k + n),
        )
    }

    /// 按 k-j-i 顺序（i 最内层）遍历所有索引
    pub fn iter(&self) -> impl Iterator<Item = Int3> + '_ {
        let b = *self;
        (b.lo.k..b.hi.k).flat_map(move |k| {
            (b.lo.j..b.hi.j)
                .flat_map(move |j| (b.lo.i..b.hi.i).map(move |i| Int3::new(i, j, k)))
        })
    }

    /// 线性偏移 (i 最内层)；调用者保证 contains(p)
    pub fn linear_index(&self, p: Int3) -> usize {
        let (ni, nj, _) = self.extent();
        let di = (p.i - self.lo.i) as usize;
        let dj = (p.j - self.lo.j) as usize;
        let dk = (p.k - self.lo.k) as usize;
        (dk * nj + dj) * ni + di
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_extent_and_len() {
        let b = Box3::new(Int3::new(-1, -1, -1), Int3::new(3, 2, 1));
        assert_eq!(b.extent(), (4, 3, 2));
        assert_eq!(b.len(), 24);
    }

    #[test]
    fn test_box_contains() {
        let b = Box3::new(Int3::new(0, 0, 0), Int3::new(2, 2, 2));
        assert!(b.contains(Int3::new(1, 1, 1)));
        assert!(!b.contains(Int3::new(2, 0, 0)));
        assert!(!b.contains(Int3::new(-1, 0, 0)));
    }

    #[test]
    fn test_linear_index_is_kji_order() {
        let b = Box3::new(Int3::new(0, 0, 0), Int3::new(3, 2, 2));
        assert_eq!(b.linear_index(Int3::new(0, 0, 0)), 0);
        assert_eq!(b.linear_index(Int3::new(1, 0, 0)), 1);
        assert_eq!(b.linear_index(Int3::new(0, 1, 0)), 3);
        assert_eq!(b.linear_index(Int3::new(0, 0, 1)), 6);
    }

    #[test]
    fn test_iter_covers_box() {
        let b = Box3::new(Int3::new(-1, 0, 0), Int3::new(1, 2, 1));
        let pts: Vec<Int3> = b.iter().collect();
        assert_eq!(pts.len(), b.len());
        assert_eq!(pts[0], Int3::new(-1, 0, 0));
        assert_eq!(*pts.last().unwrap(), Int3::new(0, 1, 0));
    }

    #[test]
    fn test_side_sign_axis() {
        assert_eq!(Side::XMin.sign(), -1);
        assert_eq!(Side::ZMax.sign(), 1);
        assert_eq!(Side::YMax.axis(), Axis::Y);
    }
}
