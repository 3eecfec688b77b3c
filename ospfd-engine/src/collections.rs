//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use generational_arena::Index;

use crate::area::Area;
use crate::error::Error;
use crate::instance::{InstanceTx, ProtocolMsg};
use crate::interface::Interface;
use crate::lsdb::{LSA_MAXAGE_SWEEP_INTERVAL, LsaEntry};
use crate::neighbor::Neighbor;
use crate::packet::lsa::{Lsa, LsaKey, LsaType};
use crate::timer::IntervalTask;

pub type ObjectId = u32;

// Phyint used by virtual links.
pub const VL_PHYINT: i32 = -1;

pub type AreaId = ObjectId;
pub type AreaIndex = Index;
pub type InterfaceId = ObjectId;
pub type InterfaceIndex = Index;
pub type NeighborId = ObjectId;
pub type NeighborIndex = Index;
pub type LsaEntryId = ObjectId;
pub type LsaEntryIndex = Index;

#[derive(Debug)]
pub struct Arena<T>(generational_arena::Arena<T>);

#[derive(Debug, Default)]
pub struct Areas {
    arena: Arena<Area>,
    id_tree: HashMap<AreaId, AreaIndex>,
    area_id_tree: BTreeMap<Ipv4Addr, AreaIndex>,
    next_id: AreaId,
}

#[derive(Debug, Default)]
pub struct Interfaces {
    id_tree: HashMap<InterfaceId, InterfaceIndex>,
    addr_tree: BTreeMap<(i32, Ipv4Addr), InterfaceIndex>,
    next_id: InterfaceId,
}

#[derive(Debug, Default)]
pub struct Neighbors {
    id_tree: HashMap<NeighborId, NeighborIndex>,
    addr_tree: BTreeMap<Ipv4Addr, NeighborIndex>,
    router_id_tree: BTreeMap<Ipv4Addr, NeighborIndex>,
    next_id: NeighborId,
}

#[derive(Debug, Default)]
pub struct Lsdb {
    id_tree: HashMap<LsaEntryId, LsaEntryIndex>,
    tree: BTreeMap<LsaType, LsdbSingleType>,
    // List of MaxAge LSAs awaiting acknowledgment and removal.
    pub maxage_lsas: HashSet<LsaEntryIndex>,
    maxage_sweeper: Option<IntervalTask<ProtocolMsg>>,
    // List of LSAs whose origination was delayed due to the MinLSInterval
    // check.
    pub delayed_orig: HashMap<LsaKey, crate::lsdb::LsaDelayedOrig>,
    // List of LSAs whose sequence number is wrapping.
    pub seqno_wrapping: HashMap<LsaKey, Lsa>,
    next_id: LsaEntryId,
    lsa_count: u32,
    cksum_sum: u32,
}

#[derive(Debug)]
pub struct LsdbSingleType {
    lsa_type: LsaType,
    tree: BTreeMap<LsaKey, LsaEntryIndex>,
    lsa_count: u32,
    cksum_sum: u32,
}

// LSDB ID.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsdbId {
    Link(AreaId, InterfaceId),
    Area(AreaId),
    As,
}

// LSDB Index.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsdbIndex {
    Link(AreaIndex, InterfaceIndex),
    Area(AreaIndex),
    As,
}

// ===== impl Arena =====

impl<T> Arena<T> {
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.0.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.0.iter_mut()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena(Default::default())
    }
}

impl<T> std::ops::Index<Index> for Arena<T> {
    type Output = T;

    fn index(&self, index: Index) -> &Self::Output {
        &self.0[index]
    }
}

impl<T> std::ops::IndexMut<Index> for Arena<T> {
    fn index_mut(&mut self, index: Index) -> &mut Self::Output {
        &mut self.0[index]
    }
}

// ===== impl Areas =====

impl Areas {
    pub(crate) fn insert(
        &mut self,
        area_id: Ipv4Addr,
    ) -> (AreaIndex, &mut Area) {
        self.next_id += 1;
        let area = Area::new(self.next_id, area_id);
        let area_idx = self.arena.0.insert(area);

        let area = &mut self.arena[area_idx];
        self.id_tree.insert(area.id, area_idx);
        self.area_id_tree.insert(area.area_id, area_idx);

        (area_idx, area)
    }

    pub(crate) fn delete(&mut self, area_idx: AreaIndex) {
        let area = &mut self.arena[area_idx];

        self.id_tree.remove(&area.id);
        self.area_id_tree.remove(&area.area_id);
        self.arena.0.remove(area_idx);
    }

    pub(crate) fn get_by_id(
        &self,
        id: AreaId,
    ) -> Result<(AreaIndex, &Area), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|area_idx| (area_idx, &self.arena[area_idx]))
            .ok_or(Error::AreaIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id(
        &mut self,
        id: AreaId,
    ) -> Result<(AreaIndex, &mut Area), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(move |area_idx| (area_idx, &mut self.arena[area_idx]))
            .ok_or(Error::AreaIdNotFound(id))
    }

    pub(crate) fn get_by_area_id(
        &self,
        area_id: Ipv4Addr,
    ) -> Option<(AreaIndex, &Area)> {
        self.area_id_tree
            .get(&area_id)
            .copied()
            .map(|area_idx| (area_idx, &self.arena[area_idx]))
    }

    pub(crate) fn get_mut_by_area_id(
        &mut self,
        area_id: Ipv4Addr,
    ) -> Option<(AreaIndex, &mut Area)> {
        self.area_id_tree
            .get(&area_id)
            .copied()
            .map(move |area_idx| (area_idx, &mut self.arena[area_idx]))
    }

    // Returns an iterator visiting all areas.
    //
    // Areas are ordered by their area IDs.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Area> {
        self.area_id_tree
            .values()
            .map(|area_idx| &self.arena[*area_idx])
    }

    // Returns an iterator over all area indexes, ordered by area ID.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = AreaIndex> + '_ {
        self.area_id_tree.values().copied()
    }

    // Returns the area ID following the given one.
    pub(crate) fn next_area_id(&self, after: Ipv4Addr) -> Option<Ipv4Addr> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.area_id_tree
            .range((Excluded(after), Unbounded))
            .next()
            .map(|(area_id, _)| *area_id)
    }

    // Returns whether we're an area border router.
    pub(crate) fn is_abr(&self, interfaces: &Arena<Interface>) -> bool {
        self.active_count(interfaces) > 1
    }

    // Returns the number of actively attached areas.
    pub(crate) fn active_count(&self, interfaces: &Arena<Interface>) -> usize {
        self.iter()
            .filter(|area| area.is_active(interfaces))
            .count()
    }

    pub(crate) fn count(&self) -> usize {
        self.area_id_tree.len()
    }
}

impl std::ops::Index<AreaIndex> for Areas {
    type Output = Area;

    fn index(&self, index: AreaIndex) -> &Self::Output {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<AreaIndex> for Areas {
    fn index_mut(&mut self, index: AreaIndex) -> &mut Self::Output {
        &mut self.arena[index]
    }
}

// ===== impl Interfaces =====

impl Interfaces {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        phyint: i32,
        addr: Ipv4Addr,
    ) -> (InterfaceIndex, &'a mut Interface) {
        self.next_id += 1;
        let iface = Interface::new(self.next_id, phyint, addr);
        let iface_idx = arena.0.insert(iface);

        let iface = &mut arena[iface_idx];
        self.id_tree.insert(iface.id, iface_idx);
        self.addr_tree.insert((phyint, addr), iface_idx);

        (iface_idx, iface)
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<Interface>,
        iface_idx: InterfaceIndex,
    ) {
        let iface = &mut arena[iface_idx];

        self.id_tree.remove(&iface.id);
        self.addr_tree.remove(&(iface.phyint, iface.addr));
        arena.0.remove(iface_idx);
    }

    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<Interface>,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &'a Interface), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|iface_idx| (iface_idx, &arena[iface_idx]))
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &'a mut Interface), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(move |iface_idx| (iface_idx, &mut arena[iface_idx]))
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    pub(crate) fn get_by_addr<'a>(
        &self,
        arena: &'a Arena<Interface>,
        phyint: i32,
        addr: Ipv4Addr,
    ) -> Option<(InterfaceIndex, &'a Interface)> {
        self.addr_tree
            .get(&(phyint, addr))
            .copied()
            .map(|iface_idx| (iface_idx, &arena[iface_idx]))
    }

    // Returns an iterator visiting all interfaces.
    //
    // Interfaces are ordered by (phyint, address).
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Interface>,
    ) -> impl Iterator<Item = &'a Interface> + 'a {
        self.addr_tree.values().map(|iface_idx| &arena[*iface_idx])
    }

    // Returns an iterator over all interface indexes, ordered by
    // (phyint, address).
    pub(crate) fn indexes(&self) -> impl Iterator<Item = InterfaceIndex> + '_ {
        self.addr_tree.values().copied()
    }

    pub(crate) fn count(&self) -> usize {
        self.addr_tree.len()
    }
}

// ===== impl Neighbors =====

impl Neighbors {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
    ) -> (NeighborIndex, &'a mut Neighbor) {
        self.next_id += 1;
        let nbr = Neighbor::new(self.next_id, router_id, src);
        let nbr_idx = arena.0.insert(nbr);

        let nbr = &mut arena[nbr_idx];
        self.id_tree.insert(nbr.id, nbr_idx);
        self.addr_tree.insert(nbr.src, nbr_idx);
        self.router_id_tree.insert(nbr.router_id, nbr_idx);

        (nbr_idx, nbr)
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<Neighbor>,
        nbr_idx: NeighborIndex,
    ) {
        let nbr = &mut arena[nbr_idx];

        self.id_tree.remove(&nbr.id);
        self.addr_tree.remove(&nbr.src);
        self.router_id_tree.remove(&nbr.router_id);
        arena.0.remove(nbr_idx);
    }

    pub(crate) fn update_router_id(
        &mut self,
        nbr_idx: NeighborIndex,
        nbr: &mut Neighbor,
        router_id: Ipv4Addr,
    ) {
        self.router_id_tree.remove(&nbr.router_id);
        nbr.router_id = router_id;
        self.router_id_tree.insert(nbr.router_id, nbr_idx);
    }

    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<Neighbor>,
        id: NeighborId,
    ) -> Result<(NeighborIndex, &'a Neighbor), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|nbr_idx| (nbr_idx, &arena[nbr_idx]))
            .ok_or(Error::NeighborIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        id: NeighborId,
    ) -> Result<(NeighborIndex, &'a mut Neighbor), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(move |nbr_idx| (nbr_idx, &mut arena[nbr_idx]))
            .ok_or(Error::NeighborIdNotFound(id))
    }

    pub(crate) fn get_by_addr<'a>(
        &self,
        arena: &'a Arena<Neighbor>,
        addr: Ipv4Addr,
    ) -> Option<(NeighborIndex, &'a Neighbor)> {
        self.addr_tree
            .get(&addr)
            .copied()
            .map(|nbr_idx| (nbr_idx, &arena[nbr_idx]))
    }

    pub(crate) fn get_by_router_id<'a>(
        &self,
        arena: &'a Arena<Neighbor>,
        router_id: Ipv4Addr,
    ) -> Option<(NeighborIndex, &'a Neighbor)> {
        self.router_id_tree
            .get(&router_id)
            .copied()
            .map(|nbr_idx| (nbr_idx, &arena[nbr_idx]))
    }

    // Returns an iterator visiting all neighbors.
    //
    // Neighbors are ordered by their source addresses.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Neighbor>,
    ) -> impl Iterator<Item = &'a Neighbor> + 'a {
        self.addr_tree.values().map(|nbr_idx| &arena[*nbr_idx])
    }

    // Returns an iterator over all neighbor indexes, ordered by source
    // address.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = NeighborIndex> + '_ {
        self.addr_tree.values().copied()
    }

    pub(crate) fn count(&self) -> usize {
        self.addr_tree.len()
    }
}

// ===== impl Lsdb =====

impl Lsdb {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<LsaEntry>,
        lsdb_id: LsdbId,
        lsa: Arc<Lsa>,
        tx: &InstanceTx,
    ) -> (LsaEntryIndex, &'a mut LsaEntry) {
        let key = lsa.hdr.key();

        self.next_id += 1;
        let lse = LsaEntry::new(lsdb_id, self.next_id, lsa, tx);
        let lse_idx = arena.0.insert(lse);

        let lse = &mut arena[lse_idx];
        self.id_tree.insert(lse.id, lse_idx);
        let lsdb_type =
            self.tree
                .entry(key.lsa_type)
                .or_insert_with(|| LsdbSingleType {
                    lsa_type: key.lsa_type,
                    tree: Default::default(),
                    lsa_count: 0,
                    cksum_sum: 0,
                });
        if lsdb_type.tree.insert(key, lse_idx).is_some() {
            // Installation removes any previous instance before inserting;
            // a duplicate key here means the database structure is corrupt
            // and no further protocol action can be trusted.
            tx.sys.halt(
                1,
                &format!("LSA database corrupt: duplicate key {key:?}"),
            );
        }

        // If the LSA's age is MaxAge, update the MaxAge list and schedule
        // the LSA removal.
        if lse.data.hdr.is_maxage() {
            self.maxage_lsas.insert(lse_idx);
            if self.maxage_sweeper.is_none() {
                let task = tx.timers.interval(
                    std::time::Duration::from_secs(LSA_MAXAGE_SWEEP_INTERVAL),
                    ProtocolMsg::LsdbMaxAgeSweep { lsdb_id },
                );
                self.maxage_sweeper = Some(task);
            }
        }

        // Update statistics.
        lsdb_type.lsa_count += 1;
        lsdb_type.cksum_sum =
            lsdb_type.cksum_sum.wrapping_add(lse.data.hdr.cksum as u32);
        self.lsa_count += 1;
        self.cksum_sum =
            self.cksum_sum.wrapping_add(lse.data.hdr.cksum as u32);

        (lse_idx, lse)
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<LsaEntry>,
        lse_idx: LsaEntryIndex,
    ) {
        let lse = &mut arena[lse_idx];
        let key = lse.data.hdr.key();
        let lsdb_type = self.tree.get_mut(&key.lsa_type).unwrap();

        // Update statistics.
        lsdb_type.lsa_count -= 1;
        lsdb_type.cksum_sum =
            lsdb_type.cksum_sum.wrapping_sub(lse.data.hdr.cksum as u32);
        self.lsa_count -= 1;
        self.cksum_sum =
            self.cksum_sum.wrapping_sub(lse.data.hdr.cksum as u32);

        self.id_tree.remove(&lse.id);
        lsdb_type.tree.remove(&key);
        if lsdb_type.tree.is_empty() {
            self.tree.remove(&key.lsa_type);
        }

        self.maxage_lsas.remove(&lse_idx);
        if self.maxage_lsas.is_empty() {
            self.maxage_sweeper = None;
        }
        arena.0.remove(lse_idx);
    }

    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<LsaEntry>,
        id: LsaEntryId,
    ) -> Result<(LsaEntryIndex, &'a LsaEntry), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|lse_idx| (lse_idx, &arena[lse_idx]))
            .ok_or(Error::LsaEntryIdNotFound(id))
    }

    pub(crate) fn get<'a>(
        &self,
        arena: &'a Arena<LsaEntry>,
        key: &LsaKey,
    ) -> Option<(LsaEntryIndex, &'a LsaEntry)> {
        self.tree
            .get(&key.lsa_type)
            .and_then(|lsdb_type| lsdb_type.tree.get(key).copied())
            .map(|lse_idx| (lse_idx, &arena[lse_idx]))
    }

    // Returns the LSA entry following the given key, in (type, advertising
    // router, LSA ID) order.
    pub(crate) fn get_next<'a>(
        &self,
        arena: &'a Arena<LsaEntry>,
        key: &LsaKey,
    ) -> Option<(LsaEntryIndex, &'a LsaEntry)> {
        use std::ops::Bound::{Excluded, Unbounded};

        // Try the remainder of the current type's tree first, then move to
        // the following types.
        if let Some(lsdb_type) = self.tree.get(&key.lsa_type)
            && let Some((_, lse_idx)) = lsdb_type
                .tree
                .range((Excluded(*key), Unbounded))
                .next()
        {
            return Some((*lse_idx, &arena[*lse_idx]));
        }
        self.tree
            .range((Excluded(key.lsa_type), Unbounded))
            .find_map(|(_, lsdb_type)| lsdb_type.tree.values().next())
            .map(|lse_idx| (*lse_idx, &arena[*lse_idx]))
    }

    // Returns an iterator visiting all LSAs, ordered by their keys.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        self.tree
            .values()
            .flat_map(|lsdb_type| lsdb_type.iter(arena))
    }

    // Returns an iterator visiting all LSAs of the given type, ordered by
    // their keys.
    pub(crate) fn iter_by_type<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
        lsa_type: LsaType,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        self.tree
            .get(&lsa_type)
            .into_iter()
            .flat_map(|lsdb_type| lsdb_type.iter(arena))
    }

    // Returns an iterator visiting all LSAs of the given type and
    // advertising router, ordered by their keys.
    pub(crate) fn iter_by_type_advrtr<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
        lsa_type: LsaType,
        adv_rtr: Ipv4Addr,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        self.tree
            .get(&lsa_type)
            .into_iter()
            .flat_map(move |lsdb_type| {
                lsdb_type.iter_by_type_advrtr(arena, adv_rtr)
            })
    }

    pub(crate) fn lsa_count(&self) -> u32 {
        self.lsa_count
    }

    pub(crate) fn lsa_count_by_type(&self, lsa_type: LsaType) -> u32 {
        self.tree
            .get(&lsa_type)
            .map(|lsdb_type| lsdb_type.lsa_count)
            .unwrap_or(0)
    }

    pub(crate) fn cksum_sum_by_type(&self, lsa_type: LsaType) -> u32 {
        self.tree
            .get(&lsa_type)
            .map(|lsdb_type| lsdb_type.cksum_sum)
            .unwrap_or(0)
    }

    pub(crate) fn cksum_sum(&self) -> u32 {
        self.cksum_sum
    }
}

// ===== impl LsdbSingleType =====

impl LsdbSingleType {
    pub(crate) fn lsa_type(&self) -> LsaType {
        self.lsa_type
    }

    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        self.tree
            .values()
            .map(|lse_idx| (*lse_idx, &arena[*lse_idx]))
    }

    pub(crate) fn iter_by_type_advrtr<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
        adv_rtr: Ipv4Addr,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        let begin = LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr,
            lsa_id: Ipv4Addr::new(0, 0, 0, 0),
        };
        let end = LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr,
            lsa_id: Ipv4Addr::new(255, 255, 255, 255),
        };
        self.tree
            .range((
                std::ops::Bound::Included(&begin),
                std::ops::Bound::Included(&end),
            ))
            .map(|(_, lse_idx)| (*lse_idx, &arena[*lse_idx]))
    }

    pub(crate) fn lsa_count(&self) -> u32 {
        self.lsa_count
    }

    pub(crate) fn cksum_sum(&self) -> u32 {
        self.cksum_sum
    }
}

// ===== global functions =====

pub(crate) fn lsdb_get<'a>(
    instance_lsdb: &'a Lsdb,
    areas: &'a Areas,
    interfaces: &'a Arena<Interface>,
    lsdb_id: &LsdbId,
) -> Result<(LsdbIndex, &'a Lsdb), Error> {
    match lsdb_id {
        LsdbId::Link(area_id, iface_id) => {
            let (area_idx, area) = areas.get_by_id(*area_id)?;
            let (iface_idx, iface) =
                area.interfaces.get_by_id(interfaces, *iface_id)?;

            Ok((LsdbIndex::Link(area_idx, iface_idx), &iface.state.lsdb))
        }
        LsdbId::Area(area_id) => {
            let (area_idx, area) = areas.get_by_id(*area_id)?;

            Ok((LsdbIndex::Area(area_idx), &area.state.lsdb))
        }
        LsdbId::As => Ok((LsdbIndex::As, instance_lsdb)),
    }
}

pub(crate) fn lsdb_get_mut<'a>(
    instance_lsdb: &'a mut Lsdb,
    areas: &'a mut Areas,
    interfaces: &'a mut Arena<Interface>,
    lsdb_id: &LsdbId,
) -> Result<(LsdbIndex, &'a mut Lsdb), Error> {
    match lsdb_id {
        LsdbId::Link(area_id, iface_id) => {
            let (area_idx, area) = areas.get_mut_by_id(*area_id)?;
            let (iface_idx, iface) =
                area.interfaces.get_mut_by_id(interfaces, *iface_id)?;

            Ok((
                LsdbIndex::Link(area_idx, iface_idx),
                &mut iface.state.lsdb,
            ))
        }
        LsdbId::Area(area_id) => {
            let (area_idx, area) = areas.get_mut_by_id(*area_id)?;

            Ok((LsdbIndex::Area(area_idx), &mut area.state.lsdb))
        }
        LsdbId::As => Ok((LsdbIndex::As, instance_lsdb)),
    }
}

pub(crate) fn lsdb_index<'a>(
    instance_lsdb: &'a Lsdb,
    areas: &'a Areas,
    interfaces: &'a Arena<Interface>,
    lsdb_idx: LsdbIndex,
) -> (LsdbId, &'a Lsdb) {
    match lsdb_idx {
        LsdbIndex::Link(area_idx, iface_idx) => {
            let area = &areas[area_idx];
            let iface = &interfaces[iface_idx];

            (LsdbId::Link(area.id, iface.id), &iface.state.lsdb)
        }
        LsdbIndex::Area(area_idx) => {
            let area = &areas[area_idx];

            (LsdbId::Area(area.id), &area.state.lsdb)
        }
        LsdbIndex::As => (LsdbId::As, instance_lsdb),
    }
}

pub(crate) fn lsdb_index_mut<'a>(
    instance_lsdb: &'a mut Lsdb,
    areas: &'a mut Areas,
    interfaces: &'a mut Arena<Interface>,
    lsdb_idx: LsdbIndex,
) -> (LsdbId, &'a mut Lsdb) {
    match lsdb_idx {
        LsdbIndex::Link(area_idx, iface_idx) => {
            let area = &areas[area_idx];
            let iface = &mut interfaces[iface_idx];

            (LsdbId::Link(area.id, iface.id), &mut iface.state.lsdb)
        }
        LsdbIndex::Area(area_idx) => {
            let area = &mut areas[area_idx];

            (LsdbId::Area(area.id), &mut area.state.lsdb)
        }
        LsdbIndex::As => (LsdbId::As, instance_lsdb),
    }
}
