// crates/bw_mesh/src/field.rs

//! 带幽灵层的单元中心张量场
//!
//! [`Field3<T>`] 以全局索引 `(i,j,k)` 访问，存储覆盖子域的幽灵盒。
//! 写入内部单元之后，邻居 rank 可见性由显式幽灵交换保证
//! （见 `halo` 模块）。

use bw_foundation::{Box3, Int3};
use glam::DVec3;
use std::ops::{Index, IndexMut};

/// 三维张量场
#[derive(Debug, Clone)]
pub struct Field3<T> {
    bbox: Box3,
    data: Vec<T>,
}

impl<T: Copy> Field3<T> {
    /// 以常量填充新场
    pub fn new(bbox: Box3, init: T) -> Self {
        Self {
            bbox,
            data: vec![init; bbox.len()],
        }
    }

    /// 场的索引盒
    pub fn bbox(&self) -> Box3 {
        self.bbox
    }

    /// 是否覆盖某索引
    pub fn contains(&self, p: Int3) -> bool {
        self.bbox.contains(p)
    }

    /// 全部填充为常量
    pub fn fill(&mut self, v: T) {
        self.data.fill(v);
    }

    /// 从同盒场整体拷贝
    pub fn copy_from(&mut self, other: &Field3<T>) {
        debug_assert_eq!(self.bbox, other.bbox);
        self.data.copy_from_slice(&other.data);
    }

    /// 按索引读取（越界即 panic，属于编程错误）
    #[inline]
    pub fn at(&self, p: Int3) -> T {
        self[p]
    }

    /// 底层数据
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Index<Int3> for Field3<T> {
    type Output = T;

    #[inline]
    fn index(&self, p: Int3) -> &T {
        debug_assert!(self.bbox.contains(p), "field index {p} outside {:?}", self.bbox);
        &self.data[self.bbox.linear_index(p)]
    }
}

impl<T> IndexMut<Int3> for Field3<T> {
    #[inline]
    fn index_mut(&mut self, p: Int3) -> &mut T {
        debug_assert!(self.bbox.contains(p), "field index {p} outside {:?}", self.bbox);
        let idx = self.bbox.linear_index(p);
        &mut self.data[idx]
    }
}

impl<T> Index<(i32, i32, i32)> for Field3<T> {
    type Output = T;

    #[inline]
    fn index(&self, p: (i32, i32, i32)) -> &T {
        &self[Int3::new(p.0, p.1, p.2)]
    }
}

impl<T> IndexMut<(i32, i32, i32)> for Field3<T> {
    #[inline]
    fn index_mut(&mut self, p: (i32, i32, i32)) -> &mut T {
        &mut self[Int3::new(p.0, p.1, p.2)]
    }
}

/// 可以打包进幽灵交换消息的单元类型
pub trait HaloPack: Copy {
    /// 每个单元的 f64 分量数
    const NCOMP: usize;

    fn pack(&self, out: &mut [f64]);
    fn unpack(src: &[f64]) -> Self;
}

impl HaloPack for f64 {
    const NCOMP: usize = 1;

    fn pack(&self, out: &mut [f64]) {
        out[0] = *self;
    }

    fn unpack(src: &[f64]) -> Self {
        src[0]
    }
}

impl HaloPack for i32 {
    const NCOMP: usize = 1;

    fn pack(&self, out: &mut [f64]) {
        out[0] = *self as f64;
    }

    fn unpack(src: &[f64]) -> Self {
        src[0] as i32
    }
}

impl HaloPack for DVec3 {
    const NCOMP: usize = 3;

    fn pack(&self, out: &mut [f64]) {
        out[0] = self.x;
        out[1] = self.y;
        out[2] = self.z;
    }

    fn unpack(src: &[f64]) -> Self {
        DVec3::new(src[0], src[1], src[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_index_with_ghosts() {
        let bbox = Box3::new(Int3::new(-1, -1, -1), Int3::new(3, 3, 3));
        let mut f = Field3::new(bbox, 0.0f64);
        f[Int3::new(-1, 2, 0)] = 7.0;
        assert_eq!(f[(-1, 2, 0)], 7.0);
        assert_eq!(f[(0, 0, 0)], 0.0);
    }

    #[test]
    fn test_fill_and_copy() {
        let bbox = Box3::new(Int3::new(0, 0, 0), Int3::new(2, 2, 2));
        let mut a = Field3::new(bbox, 1.0f64);
        let mut b = Field3::new(bbox, 0.0f64);
        a.fill(3.0);
        b.copy_from(&a);
        assert_eq!(b[(1, 1, 1)], 3.0);
    }

    #[test]
    fn test_halo_pack_roundtrip() {
        let mut buf = [0.0f64; 3];
        let v = DVec3::new(1.0, -2.0, 0.5);
        v.pack(&mut buf);
        assert_eq!(DVec3::unpack(&buf), v);

        let mut b1 = [0.0f64; 1];
        42i32.pack(&mut b1);
        assert_eq!(i32::unpack(&b1), 42);
    }
}
