//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Multi-engine conformance scenarios.
//!
//! Several engine instances are coupled through an in-memory platform and
//! driven in lock-step virtual time. Assertions go through the same
//! monitoring interface external tooling would use.

use std::cell::{Cell, RefCell};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use ipnetwork::Ipv4Network;
use ospfd_engine::config::{CfgExRt, CfgIfc, CfgIfcType, CfgOspf, ConfigItemKey};
use ospfd_engine::instance::Instance;
use ospfd_engine::sys::{
    LogLevel, MCacheEntry, MPath, Md5Seq, SendGateway, SysCalls,
};
use ospfd_monitor::{
    MonHdr, MonRequest, MonResponse, MonRqArea, MonRqIfc, MonRqLsa, MonRqNbr,
    MonRqRte,
};

// ===== in-memory platform =====

#[derive(Default)]
struct TestSys {
    now: Cell<Duration>,
    out: RefCell<Vec<(i32, Vec<u8>)>>,
    halted: Cell<Option<i32>>,
    hitless_parms: RefCell<Option<(u16, Vec<Md5Seq>)>>,
}

impl SysCalls for TestSys {
    fn elapsed_time(&self) -> Duration {
        self.now.get()
    }

    fn sendpkt(&self, pkt: &[u8], phyint: i32, _gw: SendGateway) {
        self.out.borrow_mut().push((phyint, pkt.to_vec()));
    }

    fn sendpkt_vl(&self, pkt: &[u8]) {
        self.out.borrow_mut().push((0, pkt.to_vec()));
    }

    fn phy_operational(&self, _phyint: i32) -> bool {
        true
    }

    fn phy_open(&self, _phyint: i32) {}
    fn phy_close(&self, _phyint: i32) {}
    fn join(&self, _group: Ipv4Addr, _phyint: i32) {}
    fn leave(&self, _group: Ipv4Addr, _phyint: i32) {}
    fn ip_forward(&self, _enabled: bool) {}
    fn set_multicast_routing(&self, _enabled: bool) {}
    fn set_multicast_routing_if(&self, _phyint: i32, _enabled: bool) {}

    fn rtadd(
        &self,
        _net: Ipv4Network,
        _mpath: &MPath,
        _old: Option<&MPath>,
        _reject: bool,
    ) {
    }

    fn rtdel(&self, _net: Ipv4Network, _old: Option<&MPath>) {}
    fn add_mcache(&self, _src: Ipv4Addr, _grp: Ipv4Addr, _e: &MCacheEntry) {}
    fn del_mcache(&self, _src: Ipv4Addr, _grp: Ipv4Addr) {}
    fn upload_remnants(&self) {}

    fn phyname(&self, phyint: i32) -> String {
        format!("N{phyint}")
    }

    fn spflog(&self, _level: LogLevel, _msg: &str) {}

    fn store_hitless_parms(&self, grace_period: u16, md5_seqs: &[Md5Seq]) {
        *self.hitless_parms.borrow_mut() =
            Some((grace_period, md5_seqs.to_vec()));
    }

    fn halt(&self, code: i32, _msg: &str) {
        self.halted.set(Some(code));
    }
}

// ===== test fabric =====

struct Fabric {
    routers: Vec<(Instance, Rc<TestSys>)>,
    // Segments connect (router, phyint) attachment points.
    segments: Vec<Vec<(usize, i32)>>,
    now: Duration,
}

impl Fabric {
    fn new() -> Fabric {
        Fabric {
            routers: vec![],
            segments: vec![],
            now: Duration::ZERO,
        }
    }

    fn add_router(&mut self) -> usize {
        let sys = Rc::new(TestSys::default());
        let engine = Instance::new(sys.clone());
        self.routers.push((engine, sys));
        self.routers.len() - 1
    }

    fn segment(&mut self, members: &[(usize, i32)]) {
        self.segments.push(members.to_vec());
    }

    fn engine(&mut self, idx: usize) -> &mut Instance {
        &mut self.routers[idx].0
    }

    // Delivers queued packets until the fabric is quiescent.
    fn exchange(&mut self) {
        for _ in 0..64 {
            let mut pending = vec![];
            for (idx, (_, sys)) in self.routers.iter().enumerate() {
                for (phyint, pkt) in sys.out.borrow_mut().drain(..) {
                    pending.push((idx, phyint, pkt));
                }
            }
            if pending.is_empty() {
                break;
            }
            for (src_idx, src_phy, pkt) in pending {
                let segment = self
                    .segments
                    .iter()
                    .find(|segment| segment.contains(&(src_idx, src_phy)))
                    .cloned()
                    .unwrap_or_default();
                for (dst_idx, dst_phy) in segment {
                    if dst_idx == src_idx {
                        continue;
                    }
                    self.routers[dst_idx]
                        .0
                        .receive_ip_packet(dst_phy, &pkt);
                }
            }
        }
    }

    // Advances virtual time one second at a time, exchanging packets
    // after every advance.
    fn step_secs(&mut self, secs: u64) {
        for _ in 0..secs {
            self.now += Duration::from_secs(1);
            for (engine, sys) in self.routers.iter_mut() {
                sys.now.set(self.now);
                engine.tick();
            }
            self.exchange();
        }
    }

    fn monitor(
        &mut self,
        idx: usize,
        exact: bool,
        request: MonRequest,
    ) -> (MonHdr, MonResponse) {
        self.routers[idx]
            .0
            .monitor(MonHdr::request(exact, 1), request)
    }

    fn nbr_state(
        &mut self,
        idx: usize,
        phyint: i32,
        nbr_addr: Ipv4Addr,
    ) -> Option<String> {
        match self.monitor(
            idx,
            true,
            MonRequest::Nbr(MonRqNbr { phyint, nbr_addr }),
        ) {
            (hdr, MonResponse::Nbr(rsp)) if hdr.retcode == 0 => {
                Some(rsp.n_state)
            }
            _ => None,
        }
    }
}

fn addr(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn cfg_ptp_pair(fabric: &mut Fabric) -> (usize, usize) {
    let r1 = fabric.add_router();
    let r2 = fabric.add_router();
    fabric.segment(&[(r1, 1), (r2, 1)]);

    for (idx, router_id, if_addr) in [
        (r1, "1.1.1.1", "10.0.0.1"),
        (r2, "2.2.2.2", "10.0.0.2"),
    ] {
        fabric.engine(idx).cfg_ospf(CfgOspf::new(addr(router_id)));
        fabric.engine(idx).cfg_ifc(CfgIfc::new(
            1,
            addr(if_addr),
            addr("255.255.255.252"),
            addr("0.0.0.0"),
            CfgIfcType::PointToPoint,
        ));
    }

    (r1, r2)
}

// ===== tests =====

// Two routers on a point-to-point link reach Full and end up with two
// router-LSAs with identical checksums in both databases.
#[test]
fn two_router_ptp_adjacency() {
    let mut fabric = Fabric::new();
    let (r1, r2) = cfg_ptp_pair(&mut fabric);

    fabric.step_secs(80);

    assert_eq!(
        fabric.nbr_state(r1, 1, addr("10.0.0.2")).as_deref(),
        Some("Full")
    );
    assert_eq!(
        fabric.nbr_state(r2, 1, addr("10.0.0.1")).as_deref(),
        Some("Full")
    );

    // Both LSDBs contain exactly two router-LSAs.
    for idx in [r1, r2] {
        match fabric.monitor(
            idx,
            true,
            MonRequest::Area(MonRqArea {
                area_id: addr("0.0.0.0"),
            }),
        ) {
            (hdr, MonResponse::Area(rsp)) => {
                assert_eq!(hdr.retcode, 0);
                assert_eq!(rsp.n_rtrlsas, 2);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    // And the database fingerprints are identical.
    let stats1 = fabric.engine(r1).db_stats();
    let stats2 = fabric.engine(r2).db_stats();
    assert_eq!(stats1, stats2);
    assert_eq!(stats1.n_lsas, 2);
}

// Three routers on a broadcast segment with priorities 0/1/2: the highest
// priority becomes DR, the next BDR, and the network-LSA's LS-ID is the
// DR's interface address.
#[test]
fn three_router_broadcast_dr_election() {
    let mut fabric = Fabric::new();
    let r1 = fabric.add_router();
    let r2 = fabric.add_router();
    let r3 = fabric.add_router();
    fabric.segment(&[(r1, 1), (r2, 1), (r3, 1)]);

    for (idx, router_id, if_addr, priority) in [
        (r1, "10.0.0.1", "10.1.1.1", 0),
        (r2, "10.0.0.2", "10.1.1.2", 1),
        (r3, "10.0.0.3", "10.1.1.3", 2),
    ] {
        fabric.engine(idx).cfg_ospf(CfgOspf::new(addr(router_id)));
        let mut ifc = CfgIfc::new(
            1,
            addr(if_addr),
            addr("255.255.255.0"),
            addr("0.0.0.0"),
            CfgIfcType::Broadcast,
        );
        ifc.priority = priority;
        fabric.engine(idx).cfg_ifc(ifc);
    }

    fabric.step_secs(120);

    for idx in [r1, r2, r3] {
        match fabric.monitor(
            idx,
            true,
            MonRequest::Ifc(MonRqIfc {
                phyint: 1,
                if_addr: match idx {
                    idx if idx == r1 => addr("10.1.1.1"),
                    idx if idx == r2 => addr("10.1.1.2"),
                    _ => addr("10.1.1.3"),
                },
            }),
        ) {
            (hdr, MonResponse::Ifc(rsp)) => {
                assert_eq!(hdr.retcode, 0);
                assert_eq!(rsp.if_dr, addr("10.1.1.3"), "router {idx}");
                assert_eq!(rsp.if_bdr, addr("10.1.1.2"), "router {idx}");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    // The DR originated the network-LSA with its interface address as the
    // LS-ID.
    let (hdr, response) = fabric.monitor(
        r1,
        true,
        MonRequest::Lsa(MonRqLsa {
            area_id: addr("0.0.0.0"),
            ls_type: 2,
            ls_id: addr("10.1.1.3"),
            adv_rtr: addr("10.0.0.3"),
        }),
    );
    assert_eq!(hdr.retcode, 0);
    assert!(matches!(response, MonResponse::Lsa(_)));
}

// An external route redistributed by one router shows up in the other's
// routing table as a type-2 external route; withdrawing it flushes the
// AS-external-LSA and removes the entry.
#[test]
fn external_route_redistribution() {
    let mut fabric = Fabric::new();
    let (r1, r2) = cfg_ptp_pair(&mut fabric);

    fabric.step_secs(30);

    fabric.engine(r1).cfg_ext_rt(CfgExRt {
        net: addr("8.0.0.0"),
        mask: addr("255.0.0.0"),
        type2: true,
        metric: 10,
        gw: None,
        phyint: None,
        tag: 0,
        mc_source: false,
    });
    fabric.step_secs(10);

    match fabric.monitor(
        r2,
        true,
        MonRequest::Rte(MonRqRte {
            net: addr("8.0.0.0"),
            mask: addr("255.0.0.0"),
        }),
    ) {
        (hdr, MonResponse::Rte(rsp)) => {
            assert_eq!(hdr.retcode, 0);
            assert_eq!(rsp.rt_type, "SPE2");
            assert_eq!(rsp.o_cost, 10);
            assert!(!rsp.hops.is_empty());
        }
        other => panic!("unexpected response: {other:?}"),
    }

    // Withdraw the route.
    fabric.engine(r1).cfg_delete(ConfigItemKey::ExRt {
        net: addr("8.0.0.0"),
        mask: addr("255.0.0.0"),
    });
    fabric.step_secs(10);

    let (hdr, _) = fabric.monitor(
        r2,
        true,
        MonRequest::Rte(MonRqRte {
            net: addr("8.0.0.0"),
            mask: addr("255.0.0.0"),
        }),
    );
    assert_ne!(hdr.retcode, 0);
}

// A router preparing a hitless restart originates a grace-LSA; its
// neighbor enters helper mode and keeps the adjacency Full through the
// dead interval, then gives up when the grace period expires.
#[test]
fn hitless_restart_helper() {
    let mut fabric = Fabric::new();
    let (r1, r2) = cfg_ptp_pair(&mut fabric);

    fabric.step_secs(30);
    assert_eq!(
        fabric.nbr_state(r2, 1, addr("10.0.0.1")).as_deref(),
        Some("Full")
    );

    // Prepare the restart on r1: the grace-LSA must hit the wire before
    // the platform halts the process.
    fabric.engine(r1).hitless_restart(60);
    let (_, sys1) = &fabric.routers[r1];
    assert_eq!(sys1.halted.get(), Some(0));
    let parms = sys1.hitless_parms.borrow().clone();
    assert!(parms.is_some_and(|(period, _)| period == 60));
    fabric.exchange();

    // r1 is gone; advance past the dead interval. The helper keeps the
    // neighbor Full even though no Hellos are arriving.
    let dead_r1 = fabric.routers.remove(r1);
    let r2 = 0;
    fabric.segments.clear();
    drop(dead_r1);

    fabric.step_secs(45);
    assert_eq!(
        fabric.nbr_state(r2, 1, addr("10.0.0.1")).as_deref(),
        Some("Full")
    );

    // Once the grace period runs out, the helper deletes the neighbor.
    fabric.step_secs(30);
    assert_eq!(fabric.nbr_state(r2, 1, addr("10.0.0.1")), None);
}

// With an AS-external ceiling of two, injecting three external routes
// leaves exactly two type-5 LSAs and the overflow flag set.
#[test]
fn external_overflow() {
    let mut fabric = Fabric::new();
    let r1 = fabric.add_router();

    let mut cfg = CfgOspf::new(addr("1.1.1.1"));
    cfg.ext_lsdb_limit = 2;
    cfg.exit_overflow_interval = 30;
    fabric.engine(r1).cfg_ospf(cfg);
    fabric.engine(r1).cfg_ifc(CfgIfc::new(
        1,
        addr("10.0.0.1"),
        addr("255.255.255.0"),
        addr("0.0.0.0"),
        CfgIfcType::Broadcast,
    ));

    for net in ["8.0.0.0", "9.0.0.0", "11.0.0.0"] {
        fabric.engine(r1).cfg_ext_rt(CfgExRt {
            net: addr(net),
            mask: addr("255.0.0.0"),
            type2: true,
            metric: 10,
            gw: None,
            phyint: None,
            tag: 0,
            mc_source: false,
        });
    }
    fabric.step_secs(5);

    match fabric.monitor(r1, true, MonRequest::Stat) {
        (hdr, MonResponse::Stat(rsp)) => {
            assert_eq!(hdr.retcode, 0);
            assert_eq!(rsp.overflow_state, 1);
            assert_eq!(rsp.n_aselsas, 2);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

// Area iteration with exact=0 walks the configured areas in ascending
// area-ID order and ends with a non-zero retcode.
#[test]
fn monitor_area_iteration() {
    let mut fabric = Fabric::new();
    let r1 = fabric.add_router();

    fabric.engine(r1).cfg_ospf(CfgOspf::new(addr("1.1.1.1")));
    for (phyint, if_addr, area_id) in
        [(1, "10.1.1.1", "0.0.0.1"), (2, "10.2.2.1", "0.0.0.2")]
    {
        fabric.engine(r1).cfg_ifc(CfgIfc::new(
            phyint,
            addr(if_addr),
            addr("255.255.255.0"),
            addr(area_id),
            CfgIfcType::Broadcast,
        ));
    }
    fabric.step_secs(1);

    let mut walked = vec![];
    let mut key = addr("0.0.0.0");
    loop {
        match fabric.monitor(
            r1,
            false,
            MonRequest::Area(MonRqArea { area_id: key }),
        ) {
            (hdr, MonResponse::Area(rsp)) if hdr.retcode == 0 => {
                walked.push(rsp.area_id);
                key = rsp.area_id;
            }
            (hdr, _) => {
                assert_ne!(hdr.retcode, 0);
                break;
            }
        }
    }

    assert_eq!(walked, vec![addr("0.0.0.1"), addr("0.0.0.2")]);
}
