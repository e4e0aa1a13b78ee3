// crates/bw_mesh/src/halo.rs

//! 幽灵层交换
//!
//! 三次方向扫掠：先 x，再 y（x 范围含幽灵列），最后 z（x、y 范围含
//! 幽灵列）。这样棱与角的幽灵值也会被正确填充——27 邻域的消费方
//! （相变外推等）依赖这一点。
//!
//! 发送先于接收（通道无界不会死锁）；同一对 rank 间消息保序。

use crate::comm::Communicator;
use crate::field::{Field3, HaloPack};
use bw_foundation::{Box3, Int3};

/// 对一个场执行完整的幽灵交换
///
/// `interior` 是本 rank 的内部盒，`neighbors` 按 Side 顺序
/// (-x,+x,-y,+y,-z,+z) 给出邻居 rank。场的索引盒必须是内部盒外扩
/// 一层。
pub fn exchange_halo<T: HaloPack>(
    comm: &dyn Communicator,
    interior: Box3,
    neighbors: [Option<usize>; 6],
    field: &mut Field3<T>,
) {
    debug_assert_eq!(field.bbox(), interior.grown(1), "field must carry a one-cell halo");
    if comm.size() == 1 {
        return;
    }

    let gh = field.bbox();
    let (i0, imax) = (interior.lo.i, interior.hi.i);
    let (j0, jmax) = (interior.lo.j, interior.hi.j);
    let (k0, kmax) = (interior.lo.k, interior.hi.k);
    let (ii0, iimax) = (gh.lo.i, gh.hi.i);
    let (jj0, jjmax) = (gh.lo.j, gh.hi.j);

    // x 扫掠：j、k 取内部范围
    sweep(
        comm,
        field,
        [neighbors[0], neighbors[1]],
        0,
        Box3::new(Int3::new(i0, j0, k0), Int3::new(i0 + 1, jmax, kmax)),
        Box3::new(Int3::new(imax - 1, j0, k0), Int3::new(imax, jmax, kmax)),
        Box3::new(Int3::new(i0 - 1, j0, k0), Int3::new(i0, jmax, kmax)),
        Box3::new(Int3::new(imax, j0, k0), Int3::new(imax + 1, jmax, kmax)),
    );

    // y 扫掠：i 取幽灵范围（x 幽灵已就绪），k 取内部范围
    sweep(
        comm,
        field,
        [neighbors[2], neighbors[3]],
        1,
        Box3::new(Int3::new(ii0, j0, k0), Int3::new(iimax, j0 + 1, kmax)),
        Box3::new(Int3::new(ii0, jmax - 1, k0), Int3::new(iimax, jmax, kmax)),
        Box3::new(Int3::new(ii0, j0 - 1, k0), Int3::new(iimax, j0, kmax)),
        Box3::new(Int3::new(ii0, jmax, k0), Int3::new(iimax, jmax + 1, kmax)),
    );

    // z 扫掠：i、j 都取幽灵范围
    sweep(
        comm,
        field,
        [neighbors[4], neighbors[5]],
        2,
        Box3::new(Int3::new(ii0, jj0, k0), Int3::new(iimax, jjmax, k0 + 1)),
        Box3::new(Int3::new(ii0, jj0, kmax - 1), Int3::new(iimax, jjmax, kmax)),
        Box3::new(Int3::new(ii0, jj0, k0 - 1), Int3::new(iimax, jjmax, k0)),
        Box3::new(Int3::new(ii0, jj0, kmax), Int3::new(iimax, jjmax, kmax + 1)),
    );
}

#[allow(clippy::too_many_arguments)]
fn sweep<T: HaloPack>(
    comm: &dyn Communicator,
    field: &mut Field3<T>,
    nbrs: [Option<usize>; 2],
    axis: u32,
    send_minus: Box3,
    send_plus: Box3,
    recv_minus: Box3,
    recv_plus: Box3,
) {
    // 标签编码：轴 × 2 + 发送方向。接收方匹配对侧方向的标签。
    let tag_minus = axis * 2;
    let tag_plus = axis * 2 + 1;

    if let Some(to) = nbrs[0] {
        comm.send_f64(to, tag_minus, pack_box(field, send_minus));
    }
    if let Some(to) = nbrs[1] {
        comm.send_f64(to, tag_plus, pack_box(field, send_plus));
    }
    if let Some(from) = nbrs[0] {
        let data = comm.recv_f64(from, tag_plus);
        unpack_box(field, recv_minus, &data);
    }
    if let Some(from) = nbrs[1] {
        let data = comm.recv_f64(from, tag_minus);
        unpack_box(field, recv_plus, &data);
    }
}

fn pack_box<T: HaloPack>(field: &Field3<T>, b: Box3) -> Vec<f64> {
    let mut out = vec![0.0; b.len() * T::NCOMP];
    for (n, p) in b.iter().enumerate() {
        field[p].pack(&mut out[n * T::NCOMP..(n + 1) * T::NCOMP]);
    }
    out
}

fn unpack_box<T: HaloPack>(field: &mut Field3<T>, b: Box3, data: &[f64]) {
    debug_assert_eq!(data.len(), b.len() * T::NCOMP, "halo message size mismatch");
    for (n, p) in b.iter().enumerate() {
        field[p] = T::unpack(&data[n * T::NCOMP..(n + 1) * T::NCOMP]);
    }
}
