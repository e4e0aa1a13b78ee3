// crates/bw_mesh/src/comm.rs

//! 通信子抽象
//!
//! 求解器代码按 rank 本地方式书写，所有集合操作经过 [`Communicator`]：
//! - [`SoloComm`]: 单 rank，规约与屏障都是恒等操作
//! - [`ThreadComm`]: 进程内多 rank，每个 rank 一个线程，点对点消息
//!   走通道，规约走共享槽位 + 条件变量
//!
//! 点对点发送不阻塞（通道无界）；接收阻塞直到匹配的消息到达。
//! 同一对 rank 之间的消息保序，这是幽灵交换协议依赖的性质。

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};

/// 规约操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Min,
    Max,
    Sum,
}

impl ReduceOp {
    fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
            ReduceOp::Sum => a + b,
        }
    }
}

/// rank 间通信接口
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// 同步屏障
    fn barrier(&self);

    /// 按元素全规约（所有 rank 得到结果）
    fn allreduce_f64(&self, vals: &mut [f64], op: ReduceOp);

    /// 整型全规约
    fn allreduce_i64(&self, vals: &mut [i64], op: ReduceOp);

    /// 求和规约到 root (rank 0)；非 root 的 vals 保持不变
    fn reduce_sum_f64_to_root(&self, vals: &mut [f64]);

    /// 点对点发送（不阻塞）
    fn send_f64(&self, to: usize, tag: u32, data: Vec<f64>);

    /// 点对点接收（阻塞直到匹配）
    fn recv_f64(&self, from: usize, tag: u32) -> Vec<f64>;
}

// ============================================================
// 单 rank
// ============================================================

/// 单 rank 通信子
#[derive(Debug, Default, Clone, Copy)]
pub struct SoloComm;

impl Communicator for SoloComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn allreduce_f64(&self, _vals: &mut [f64], _op: ReduceOp) {}

    fn allreduce_i64(&self, _vals: &mut [i64], _op: ReduceOp) {}

    fn reduce_sum_f64_to_root(&self, _vals: &mut [f64]) {}

    fn send_f64(&self, to: usize, _tag: u32, _data: Vec<f64>) {
        unreachable!("SoloComm has no peer rank {to} to send to")
    }

    fn recv_f64(&self, from: usize, _tag: u32) -> Vec<f64> {
        unreachable!("SoloComm has no peer rank {from} to receive from")
    }
}

// ============================================================
// 进程内多 rank
// ============================================================

struct Msg {
    from: usize,
    tag: u32,
    data: Vec<f64>,
}

#[derive(Default)]
struct ReduceSlot {
    count: usize,
    generation: u64,
    acc: Vec<f64>,
    result: Vec<f64>,
}

struct Shared {
    n: usize,
    barrier: Barrier,
    reduce: Mutex<ReduceSlot>,
    reduce_cv: Condvar,
}

/// 进程内多 rank 通信子
///
/// 由 [`ThreadComm::run`] 创建；每个 rank 一个实例，归属一个线程。
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
    senders: Vec<mpsc::Sender<Msg>>,
    receiver: Mutex<mpsc::Receiver<Msg>>,
    pending: Mutex<VecDeque<Msg>>,
}

impl ThreadComm {
    /// 启动 n 个 rank，在各自线程上执行同一个 SPMD 函数，返回各 rank 的结果
    pub fn run<R, F>(n: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&ThreadComm) -> R + Send + Sync,
    {
        assert!(n >= 1, "need at least one rank");
        let shared = Arc::new(Shared {
            n,
            barrier: Barrier::new(n),
            reduce: Mutex::new(ReduceSlot::default()),
            reduce_cv: Condvar::new(),
        });

        let mut txs = Vec::with_capacity(n);
        let mut rxs = Vec::with_capacity(n);
        for _ in 0..n {
            let (tx, rx) = mpsc::channel::<Msg>();
            txs.push(tx);
            rxs.push(rx);
        }

        let comms: Vec<ThreadComm> = rxs
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
                senders: txs.clone(),
                receiver: Mutex::new(rx),
                pending: Mutex::new(VecDeque::new()),
            })
            .collect();
        drop(txs);

        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles.into_iter().map(|h| h.join().expect("rank thread panicked")).collect()
        })
    }

    fn allreduce_impl(&self, vals: &mut [f64], op: ReduceOp) {
        let shared = &self.shared;
        let mut slot = shared.reduce.lock();
        if slot.count == 0 {
            slot.acc = vals.to_vec();
        } else {
            assert_eq!(slot.acc.len(), vals.len(), "mismatched allreduce lengths");
            for (a, v) in slot.acc.iter_mut().zip(vals.iter()) {
                *a = op.combine(*a, *v);
            }
        }
        slot.count += 1;
        if slot.count == shared.n {
            slot.result = std::mem::take(&mut slot.acc);
            slot.generation += 1;
            slot.count = 0;
            vals.copy_from_slice(&slot.result);
            shared.reduce_cv.notify_all();
        } else {
            let gen = slot.generation;
            while slot.generation == gen {
                shared.reduce_cv.wait(&mut slot);
            }
            vals.copy_from_slice(&slot.result);
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.n
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn allreduce_f64(&self, vals: &mut [f64], op: ReduceOp) {
        self.allreduce_impl(vals, op);
    }

    fn allreduce_i64(&self, vals: &mut [i64], op: ReduceOp) {
        let mut tmp: Vec<f64> = vals.iter().map(|&v| v as f64).collect();
        self.allreduce_impl(&mut tmp, op);
        for (v, t) in vals.iter_mut().zip(tmp.iter()) {
            *v = t.round() as i64;
        }
    }

    fn reduce_sum_f64_to_root(&self, vals: &mut [f64]) {
        let mut tmp = vals.to_vec();
        self.allreduce_impl(&mut tmp, ReduceOp::Sum);
        if self.rank == 0 {
            vals.copy_from_slice(&tmp);
        }
    }

    fn send_f64(&self, to: usize, tag: u32, data: Vec<f64>) {
        self.senders[to]
            .send(Msg { from: self.rank, tag, data })
            .expect("peer rank hung up");
    }

    fn recv_f64(&self, from: usize, tag: u32) -> Vec<f64> {
        // 先翻挂起队列，再从通道取
        {
            let mut pending = self.pending.lock();
            if let Some(pos) = pending.iter().position(|m| m.from == from && m.tag == tag) {
                return pending.remove(pos).expect("position is valid").data;
            }
        }
        let rx = self.receiver.lock();
        loop {
            let msg = rx.recv().expect("peer rank hung up");
            if msg.from == from && msg.tag == tag {
                return msg.data;
            }
            self.pending.lock().push_back(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solo_allreduce_is_identity() {
        let comm = SoloComm;
        let mut v = [3.0, -1.0];
        comm.allreduce_f64(&mut v, ReduceOp::Max);
        assert_eq!(v, [3.0, -1.0]);
    }

    #[test]
    fn test_thread_allreduce_sum() {
        let results = ThreadComm::run(4, |comm| {
            let mut v = [comm.rank() as f64, 1.0];
            comm.allreduce_f64(&mut v, ReduceOp::Sum);
            v
        });
        for v in results {
            assert_eq!(v, [6.0, 4.0]);
        }
    }

    #[test]
    fn test_thread_allreduce_min_max_repeated() {
        let results = ThreadComm::run(3, |comm| {
            let mut lo = [comm.rank() as f64];
            comm.allreduce_f64(&mut lo, ReduceOp::Min);
            let mut hi = [comm.rank() as f64];
            comm.allreduce_f64(&mut hi, ReduceOp::Max);
            (lo[0], hi[0])
        });
        for (lo, hi) in results {
            assert_eq!(lo, 0.0);
            assert_eq!(hi, 2.0);
        }
    }

    #[test]
    fn test_thread_allreduce_i64_sum() {
        let results = ThreadComm::run(3, |comm| {
            let mut v = [1i64];
            comm.allreduce_i64(&mut v, ReduceOp::Sum);
            v[0]
        });
        assert!(results.iter().all(|&v| v == 3));
    }

    #[test]
    fn test_thread_send_recv() {
        let results = ThreadComm::run(2, |comm| {
            if comm.rank() == 0 {
                comm.send_f64(1, 7, vec![1.0, 2.0]);
                comm.recv_f64(1, 9)
            } else {
                comm.send_f64(0, 9, vec![5.0]);
                comm.recv_f64(0, 7)
            }
        });
        assert_eq!(results[0], vec![5.0]);
        assert_eq!(results[1], vec![1.0, 2.0]);
    }

    #[test]
    fn test_reduce_to_root() {
        let results = ThreadComm::run(3, |comm| {
            let mut v = [1.0, (comm.rank() + 1) as f64];
            comm.reduce_sum_f64_to_root(&mut v);
            v
        });
        assert_eq!(results[0], [3.0, 6.0]);
        assert_eq!(results[1], [1.0, 2.0]); // 非 root 不变
    }
}
