//! Load/Store Queue Forwarding Tests.
//!
//! Table-driven coverage of the forwarding decision for one older store and one
//! load: full cover at any offset, partial overlap and no overlap. Addresses whose
//! access would run past the top of the address space are refused with a fault.

use rstest::rstest;

use ooosim_core::common::{AccessSize, ExceptionCause, RobId, SeqNum};
use ooosim_core::core::lsq::{ForwardResult, Lsq};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value(u64),
    Drain,
    Memory,
}

fn decide(
    store_addr: u64,
    store_size: AccessSize,
    data: u64,
    load_addr: u64,
    load_size: AccessSize,
) -> Expect {
    let mut q = Lsq::new(4, 4, 2, 64);
    let s = q
        .allocate_store(RobId(0), SeqNum(0), store_size)
        .expect("store slot");
    assert_eq!(q.set_store_address(s, store_addr), Ok(None));
    q.set_store_data(s, data);
    let l = q
        .allocate_load(RobId(1), SeqNum(1), load_size, false)
        .expect("load slot");
    q.set_load_address(l, load_addr).expect("load address in range");
    match q.check_forwarding(l).result {
        ForwardResult::Forward { data, .. } => Expect::Value(data),
        ForwardResult::WaitDrain(_) => Expect::Drain,
        ForwardResult::Memory => Expect::Memory,
        other @ ForwardResult::WaitData(_) => panic!("store data was known: {other:?}"),
    }
}

#[rstest]
#[case::low_word(0x1000, AccessSize::Double, 0xAABB_CCDD, 0x1000, AccessSize::Word, Expect::Value(0xAABB_CCDD))]
#[case::high_word(0x1000, AccessSize::Double, 0x1122_3344_5566_7788, 0x1004, AccessSize::Word, Expect::Value(0x1122_3344))]
#[case::inner_half(0x1000, AccessSize::Double, 0x1122_3344_5566_7788, 0x1006, AccessSize::Half, Expect::Value(0x1122))]
#[case::exact_byte(0x2003, AccessSize::Byte, 0x1FF, 0x2003, AccessSize::Byte, Expect::Value(0xFF))]
#[case::straddles_end(0x1000, AccessSize::Word, 0xDEAD_BEEF, 0x1002, AccessSize::Word, Expect::Drain)]
#[case::wider_load(0x1004, AccessSize::Half, 0xBEEF, 0x1000, AccessSize::Double, Expect::Drain)]
#[case::same_granule_disjoint(0x1000, AccessSize::Byte, 0x7F, 0x1001, AccessSize::Byte, Expect::Memory)]
#[case::other_granule(0x1000, AccessSize::Double, 1, 0x1008, AccessSize::Double, Expect::Memory)]
fn forwarding_decision(
    #[case] store_addr: u64,
    #[case] store_size: AccessSize,
    #[case] data: u64,
    #[case] load_addr: u64,
    #[case] load_size: AccessSize,
    #[case] expected: Expect,
) {
    assert_eq!(
        decide(store_addr, store_size, data, load_addr, load_size),
        expected
    );
}

#[rstest]
#[case::no_stores(false, true)]
#[case::store_elsewhere(true, true)]
fn disambiguation_filter_skips_the_scan(#[case] with_store: bool, #[case] filtered: bool) {
    let mut q = Lsq::new(4, 4, 2, 64);
    if with_store {
        let s = q
            .allocate_store(RobId(0), SeqNum(0), AccessSize::Double)
            .expect("store slot");
        let _ = q.set_store_address(s, 0x8000);
    }
    let l = q
        .allocate_load(RobId(1), SeqNum(1), AccessSize::Word, false)
        .expect("load slot");
    q.set_load_address(l, 0x100).expect("load address in range");
    let check = q.check_forwarding(l);
    assert_eq!(check.filtered, filtered);
    assert_eq!(check.result, ForwardResult::Memory);
}

#[rstest]
#[case::double_straddles_top(u64::MAX - 3, AccessSize::Double)]
#[case::word_at_last_byte(u64::MAX, AccessSize::Word)]
#[case::byte_at_last_byte(u64::MAX, AccessSize::Byte)]
fn wrapping_addresses_fault_without_touching_the_queues(#[case] addr: u64, #[case] size: AccessSize) {
    let mut q = Lsq::new(4, 4, 2, 16);
    let s = q
        .allocate_store(RobId(0), SeqNum(0), size)
        .expect("store slot");
    assert_eq!(
        q.set_store_address(s, addr),
        Err(ExceptionCause::StoreAccessFault(addr))
    );
    let l = q
        .allocate_load(RobId(1), SeqNum(1), size, false)
        .expect("load slot");
    assert_eq!(
        q.set_load_address(l, addr),
        Err(ExceptionCause::LoadAccessFault(addr))
    );
    assert_eq!(q.mdu().tracked(), 0);
    assert!(q.stores().get(s).is_some_and(|e| e.addr.is_none()));
    assert!(q.loads().get(l).is_some_and(|e| e.addr.is_none()));
}
