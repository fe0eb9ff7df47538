//! TCP（简化版）协议实现
//!
//! 目标：支持 RED 验证实验所需的最小功能：
//! - 字节流语义：应用写入多少字节，发送端按段切分发送
//! - Reno 风格的拥塞控制（慢启动 + AIMD，含 3 dupACK 快速重传 / 快速恢复）
//! - 超时重传：SRTT/RTTVAR 估计 RTO，Karn 规则，指数退避，超时后回退到最早未确认字节重发
//! - 发送窗口 = min(cwnd, 固定窗口)
//! - 接收端缓存乱序数据，按 `del_ack_count` 发送累计 ACK（不足时由延迟 ACK 定时器补发）
//!
//! 注意：这是仿真用途的“极简 TCP”，不实现握手/FIN/窗口通告/选择确认等，连接视为已建立。

use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use tracing::{debug, trace};

use crate::net::{FiveTuple, NetWorld, Network, NodeId, TcpSegment, Transport};
use crate::sim::{Event, SimTime, Simulator, World};

/// 一个 TCP 连接的唯一标识（packet 的 `conn_id`）。
pub type TcpConnId = u64;

/// 第一个临时端口
pub const EPHEMERAL_PORT_BASE: u16 = 49153;

#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// 每段最大载荷（字节）
    pub segment_size: u32,
    /// 每个 packet 的头部开销（IP + TCP + 链路层，字节）
    pub header_bytes: u32,
    /// 收到多少个数据段后立即发送 ACK
    pub del_ack_count: u32,
    /// 延迟 ACK 超时
    pub del_ack_timeout: SimTime,
    /// 固定发送窗口上限（字节）
    pub fixed_window: u64,
    /// 初始 cwnd（段数）
    pub init_cwnd_segs: u64,
    /// 初始 ssthresh（字节）
    pub init_ssthresh: u64,
    pub init_rto: SimTime,
    pub min_rto: SimTime,
    pub max_rto: SimTime,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            segment_size: 1000 - 42,
            header_bytes: 42,
            del_ack_count: 1,
            del_ack_timeout: SimTime::from_millis(200),
            fixed_window: 15_000,
            init_cwnd_segs: 1,
            init_ssthresh: 65_535,
            init_rto: SimTime::from_secs(1),
            min_rto: SimTime::from_millis(200),
            max_rto: SimTime::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TcpConn {
    pub id: TcpConnId,
    pub src: NodeId,
    pub dst: NodeId,
    /// 数据方向的五元组（ACK 使用其反向）
    pub tuple: FiveTuple,
    cfg: TcpConfig,

    // sender
    app_bytes: u64,
    next_seq: u64,
    high_tx: u64,
    last_acked: u64,
    cwnd: u64,
    ssthresh: u64,
    dup_acks: u32,
    in_recovery: bool,
    srtt: Option<f64>,
    rttvar: f64,
    rto: SimTime,
    rto_epoch: u64,
    rto_armed: bool,
    /// 段末字节序号 -> 首次发送时间（仅用于 RTT 采样）
    timing: BTreeMap<u64, SimTime>,

    // receiver
    rcv_nxt: u64,
    ooo: BTreeMap<u64, u64>,
    unacked_segs: u32,
    delack_epoch: u64,

    // stats
    pub retransmits: u64,
    pub timeouts: u64,
    start_at: Option<SimTime>,
}

impl TcpConn {
    pub fn new(id: TcpConnId, src: NodeId, dst: NodeId, tuple: FiveTuple, cfg: TcpConfig) -> Self {
        let mss = cfg.segment_size.max(1) as u64;
        Self {
            id,
            src,
            dst,
            tuple,
            app_bytes: 0,
            next_seq: 0,
            high_tx: 0,
            last_acked: 0,
            cwnd: cfg.init_cwnd_segs.max(1).saturating_mul(mss),
            ssthresh: cfg.init_ssthresh.max(2 * mss),
            dup_acks: 0,
            in_recovery: false,
            srtt: None,
            rttvar: 0.0,
            rto: cfg.init_rto,
            rto_epoch: 0,
            rto_armed: false,
            timing: BTreeMap::new(),
            rcv_nxt: 0,
            ooo: BTreeMap::new(),
            unacked_segs: 0,
            delack_epoch: 0,
            retransmits: 0,
            timeouts: 0,
            start_at: None,
            cfg,
        }
    }

    fn mss(&self) -> u64 {
        self.cfg.segment_size.max(1) as u64
    }

    /// 应用写入的总字节数
    pub fn bytes_written(&self) -> u64 {
        self.app_bytes
    }

    pub fn bytes_acked(&self) -> u64 {
        self.last_acked
    }

    /// 接收端按序收到的字节数
    pub fn bytes_received(&self) -> u64 {
        self.rcv_nxt
    }

    pub fn cwnd(&self) -> u64 {
        self.cwnd
    }

    pub fn rto(&self) -> SimTime {
        self.rto
    }

    pub fn start_time(&self) -> Option<SimTime> {
        self.start_at
    }

    fn inflight(&self) -> u64 {
        self.next_seq.saturating_sub(self.last_acked)
    }

    fn on_rtt_sample(&mut self, r: f64) {
        match self.srtt {
            None => {
                self.srtt = Some(r);
                self.rttvar = r / 2.0;
            }
            Some(srtt) => {
                self.rttvar = 0.75 * self.rttvar + 0.25 * (srtt - r).abs();
                self.srtt = Some(0.875 * srtt + 0.125 * r);
            }
        }
        let srtt = self.srtt.unwrap_or(r);
        let rto = SimTime::from_secs_f64(srtt + (4.0 * self.rttvar).max(1e-3));
        self.rto = rto.max(self.cfg.min_rto).min(self.cfg.max_rto);
        trace!(conn_id = self.id, rtt = r, srtt, rto = ?self.rto, "RTT 采样");
    }

    /// 接收端处理数据段，返回新增的按序字节数
    pub(crate) fn receive(&mut self, seq: u64, len: u32) -> u64 {
        let end = seq.saturating_add(len as u64);
        let before = self.rcv_nxt;
        if seq <= self.rcv_nxt {
            self.rcv_nxt = self.rcv_nxt.max(end);
        } else {
            let e = self.ooo.entry(seq).or_insert(end);
            *e = (*e).max(end);
        }
        while let Some((&s, &e)) = self.ooo.first_key_value() {
            if s > self.rcv_nxt {
                break;
            }
            self.rcv_nxt = self.rcv_nxt.max(e);
            self.ooo.remove(&s);
        }
        self.rcv_nxt - before
    }
}

#[derive(Debug)]
pub struct TcpStack {
    cfg: TcpConfig,
    conns: BTreeMap<TcpConnId, TcpConn>,
    next_id: TcpConnId,
    next_port: u16,
}

impl Default for TcpStack {
    fn default() -> Self {
        Self {
            cfg: TcpConfig::default(),
            conns: BTreeMap::new(),
            next_id: 1,
            next_port: EPHEMERAL_PORT_BASE,
        }
    }
}

impl TcpStack {
    pub fn set_config(&mut self, cfg: TcpConfig) {
        self.cfg = cfg;
    }

    pub fn config(&self) -> &TcpConfig {
        &self.cfg
    }

    pub fn get(&self, id: TcpConnId) -> Option<&TcpConn> {
        self.conns.get(&id)
    }

    pub fn conns(&self) -> impl Iterator<Item = &TcpConn> {
        self.conns.values()
    }

    /// 打开一条从 `src` 到 `remote` 的连接（分配临时端口）
    pub fn connect(
        &mut self,
        src: NodeId,
        local_ip: std::net::Ipv4Addr,
        dst: NodeId,
        remote: SocketAddrV4,
    ) -> TcpConnId {
        let id = self.next_id;
        self.next_id += 1;
        let port = self.next_port;
        self.next_port = self.next_port.checked_add(1).unwrap_or(EPHEMERAL_PORT_BASE);
        let tuple = FiveTuple::tcp(SocketAddrV4::new(local_ip, port), remote);
        debug!(conn_id = id, %tuple.src, %tuple.dst, "打开 TCP 连接");
        self.conns
            .insert(id, TcpConn::new(id, src, dst, tuple, self.cfg.clone()));
        id
    }

    /// 应用写入 `bytes` 字节
    pub fn app_write(&mut self, id: TcpConnId, bytes: u64, sim: &mut Simulator, net: &mut Network) {
        let Some(conn) = self.conns.get_mut(&id) else {
            return;
        };
        conn.app_bytes = conn.app_bytes.saturating_add(bytes);
        if conn.start_at.is_none() {
            conn.start_at = Some(sim.now());
        }
        self.send_data_if_possible(id, sim, net);
    }

    fn send_segment(conn: &mut TcpConn, seq: u64, len: u32, sim: &mut Simulator, net: &mut Network) {
        let retrans = seq < conn.high_tx;
        if retrans {
            conn.retransmits += 1;
        } else {
            conn.timing.insert(seq + len as u64, sim.now());
        }
        let pkt = net.make_packet(
            conn.id,
            len + conn.cfg.header_bytes,
            conn.src,
            conn.dst,
            conn.tuple,
            Transport::Tcp(TcpSegment::Data { seq, len }),
        );
        trace!(conn_id = conn.id, seq, len, retrans, "发送数据段");
        if !conn.rto_armed {
            Self::arm_rto(conn, sim);
        }
        net.send(pkt, sim);
    }

    fn arm_rto(conn: &mut TcpConn, sim: &mut Simulator) {
        conn.rto_epoch += 1;
        conn.rto_armed = true;
        sim.schedule_in(
            conn.rto,
            TcpRto {
                conn_id: conn.id,
                epoch: conn.rto_epoch,
            },
        );
    }

    pub(crate) fn send_data_if_possible(&mut self, id: TcpConnId, sim: &mut Simulator, net: &mut Network) {
        let Some(conn) = self.conns.get_mut(&id) else {
            return;
        };
        let mss = conn.mss();
        loop {
            let window = conn.cwnd.min(conn.cfg.fixed_window);
            let avail_win = window.saturating_sub(conn.inflight());
            let avail_data = conn.app_bytes.saturating_sub(conn.next_seq);
            if avail_data == 0 || avail_win == 0 {
                break;
            }
            // 避免糊涂窗口：窗口不足一个 MSS 且数据多于窗口时等待
            if avail_win < mss && avail_data > avail_win {
                break;
            }
            let len = mss.min(avail_data).min(avail_win) as u32;
            let seq = conn.next_seq;
            Self::send_segment(conn, seq, len, sim, net);
            conn.next_seq += len as u64;
            conn.high_tx = conn.high_tx.max(conn.next_seq);
        }
    }

    fn send_ack(conn: &mut TcpConn, sim: &mut Simulator, net: &mut Network) {
        conn.unacked_segs = 0;
        conn.delack_epoch += 1;
        let pkt = net.make_packet(
            conn.id,
            conn.cfg.header_bytes,
            conn.dst,
            conn.src,
            conn.tuple.reversed(),
            Transport::Tcp(TcpSegment::Ack { ack: conn.rcv_nxt }),
        );
        trace!(conn_id = conn.id, ack = conn.rcv_nxt, "发送 ACK");
        net.send(pkt, sim);
    }

    pub fn on_tcp_segment(
        &mut self,
        conn_id: TcpConnId,
        at: NodeId,
        seg: TcpSegment,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        match seg {
            TcpSegment::Data { seq, len } => {
                let Some(conn) = self.conns.get_mut(&conn_id) else {
                    return;
                };
                if at != conn.dst {
                    return;
                }
                let in_order = seq == conn.rcv_nxt;
                let newly = conn.receive(seq, len);
                if newly > 0 {
                    net.sinks.on_data(conn.dst, &conn.tuple.dst, newly);
                }
                conn.unacked_segs += 1;
                // 乱序或重复数据立即 ACK（触发对端 dupACK 计数）
                if !in_order || conn.unacked_segs >= conn.cfg.del_ack_count {
                    Self::send_ack(conn, sim, net);
                } else if conn.unacked_segs == 1 {
                    sim.schedule_in(
                        conn.cfg.del_ack_timeout,
                        TcpDelAck {
                            conn_id,
                            epoch: conn.delack_epoch,
                        },
                    );
                }
            }
            TcpSegment::Ack { ack } => {
                let Some(conn) = self.conns.get_mut(&conn_id) else {
                    return;
                };
                if at != conn.src {
                    return;
                }
                let mss = conn.mss();

                if ack > conn.last_acked {
                    // Karn：只用未重传段的发送时间采样
                    let sample = conn
                        .timing
                        .range(..=ack)
                        .next_back()
                        .map(|(_, &t)| sim.now().saturating_sub(t));
                    conn.timing = conn.timing.split_off(&(ack + 1));
                    if let Some(r) = sample {
                        conn.on_rtt_sample(r.as_secs_f64());
                    }

                    let newly = ack - conn.last_acked;
                    conn.last_acked = ack;
                    conn.next_seq = conn.next_seq.max(ack);
                    conn.dup_acks = 0;

                    if conn.in_recovery {
                        conn.cwnd = conn.ssthresh;
                        conn.in_recovery = false;
                    } else if conn.cwnd < conn.ssthresh {
                        conn.cwnd = conn.cwnd.saturating_add(newly.min(mss));
                    } else {
                        let inc = (mss.saturating_mul(mss) / conn.cwnd.max(1)).max(1);
                        conn.cwnd = conn.cwnd.saturating_add(inc);
                    }

                    conn.rto_armed = false;
                    if conn.inflight() > 0 {
                        Self::arm_rto(conn, sim);
                    } else {
                        conn.rto_epoch += 1;
                    }
                    self.send_data_if_possible(conn_id, sim, net);
                } else if ack == conn.last_acked && conn.inflight() > 0 {
                    conn.dup_acks += 1;
                    if conn.dup_acks == 3 && !conn.in_recovery {
                        // 快速重传
                        conn.ssthresh = (conn.inflight() / 2).max(2 * mss);
                        conn.cwnd = conn.ssthresh.saturating_add(3 * mss);
                        conn.in_recovery = true;
                        conn.timing.clear();
                        let len = mss.min(conn.high_tx - conn.last_acked) as u32;
                        let seq = conn.last_acked;
                        debug!(conn_id, seq, "3 dupACK 快速重传");
                        Self::send_segment(conn, seq, len, sim, net);
                    } else if conn.dup_acks > 3 && conn.in_recovery {
                        // 快速恢复：每个额外 dupACK 增加 cwnd 一个 MSS
                        conn.cwnd = conn.cwnd.saturating_add(mss);
                        self.send_data_if_possible(conn_id, sim, net);
                    }
                }
            }
        }
    }

    fn on_rto(&mut self, conn_id: TcpConnId, epoch: u64, sim: &mut Simulator, net: &mut Network) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        if epoch != conn.rto_epoch || !conn.rto_armed || conn.inflight() == 0 {
            return;
        }
        let mss = conn.mss();
        conn.timeouts += 1;
        conn.ssthresh = (conn.inflight() / 2).max(2 * mss);
        conn.cwnd = mss;
        conn.dup_acks = 0;
        conn.in_recovery = false;
        conn.timing.clear();
        // 回退到最早未确认字节重新发送
        conn.next_seq = conn.last_acked;
        conn.rto = SimTime(conn.rto.0.saturating_mul(2)).min(conn.cfg.max_rto);
        conn.rto_armed = false;
        debug!(conn_id, seq = conn.last_acked, rto = ?conn.rto, "⏰ RTO 超时");
        self.send_data_if_possible(conn_id, sim, net);
    }

    fn on_del_ack(&mut self, conn_id: TcpConnId, epoch: u64, sim: &mut Simulator, net: &mut Network) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        if epoch != conn.delack_epoch || conn.unacked_segs == 0 {
            return;
        }
        Self::send_ack(conn, sim, net);
    }
}

fn with_tcp<F>(world: &mut dyn World, f: F)
where
    F: FnOnce(&mut TcpStack, &mut Network),
{
    let w = world
        .as_any_mut()
        .downcast_mut::<NetWorld>()
        .expect("world must be NetWorld");
    // 规避同时借用 `w.net` 与 `w.net.tcp`
    let mut tcp = std::mem::take(&mut w.net.tcp);
    f(&mut tcp, &mut w.net);
    w.net.tcp = tcp;
}

/// TCP RTO 事件：epoch 不匹配（期间已重置定时器）则忽略
#[derive(Debug)]
pub struct TcpRto {
    pub conn_id: TcpConnId,
    pub epoch: u64,
}

impl Event for TcpRto {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TcpRto { conn_id, epoch } = *self;
        with_tcp(world, |tcp, net| tcp.on_rto(conn_id, epoch, sim, net));
    }
}

/// 延迟 ACK 定时器
#[derive(Debug)]
pub struct TcpDelAck {
    pub conn_id: TcpConnId,
    pub epoch: u64,
}

impl Event for TcpDelAck {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TcpDelAck { conn_id, epoch } = *self;
        with_tcp(world, |tcp, net| tcp.on_del_ack(conn_id, epoch, sim, net));
    }
}

