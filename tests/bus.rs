//! Bus-level integration: device registration, redirect overlays, and handle
//! traversal across range boundaries.

use std::sync::Arc;

use nanoscope::soc::bus::{BusError, DataHandle, DeviceBus, RangeKind};
use nanoscope::soc::device::{BasicMemory, Endianness};

fn memory(name: &str, size: usize, endian: Endianness) -> Arc<BasicMemory> {
    Arc::new(BasicMemory::new(name, size, endian))
}

#[test]
fn overlay_resolution_and_overlap_rejection() {
    let bus = DeviceBus::new(32);
    bus.register_device(memory("flash", 0x4000, Endianness::Little), 0x0)
        .expect("flash registers");
    bus.register_device(memory("ram", 0x8000, Endianness::Little), 0x4000_0000)
        .expect("ram registers");
    bus.redirect(0x1000, 0x100, 0x4000_0800).expect("overlay registers");

    let inside = bus.resolve(0x1050).expect("overlay window resolves");
    assert_eq!(inside.kind, RangeKind::Redirect);
    assert_eq!(inside.device.name(), "ram");
    assert_eq!(inside.offset_of(0x1050), 0x850, "overlay forwards into ram");

    let outside = bus.resolve(0x2000).expect("flash still resolves");
    assert_eq!(outside.device.name(), "flash");
    assert_eq!(outside.offset_of(0x2000), 0x2000, "flash untouched outside the overlay");

    let err = bus.register_device(memory("flash2", 0x100, Endianness::Little), 0x800);
    assert!(
        matches!(err, Err(BusError::Overlap { .. })),
        "equal-priority overlap must be rejected: {err:?}"
    );
}

#[test]
fn redirect_writes_land_on_the_target_device() {
    let bus = Arc::new(DeviceBus::new(32));
    bus.register_device(memory("flash", 0x4000, Endianness::Little), 0x0)
        .unwrap();
    bus.register_device(memory("ram", 0x8000, Endianness::Little), 0x4000_0000)
        .unwrap();
    bus.redirect(0x1000, 0x100, 0x4000_0800).unwrap();

    let mut writer = DataHandle::new(bus.clone());
    writer.jump(0x1010).unwrap();
    writer.write_u32(0xFEED_BEEF).unwrap();

    let mut reader = DataHandle::new(bus.clone());
    reader.jump(0x4000_0810).unwrap();
    assert_eq!(
        reader.read_u32().unwrap(),
        0xFEED_BEEF,
        "bytes written through the alias surface on the target device"
    );
}

#[test]
fn handles_rebind_when_crossing_range_boundaries() {
    let bus = Arc::new(DeviceBus::new(32));
    bus.register_device(memory("low", 0x1000, Endianness::Little), 0x0)
        .unwrap();
    bus.register_device(memory("high", 0x1000, Endianness::Big), 0x1000)
        .unwrap();

    let mut handle = DataHandle::new(bus);
    handle.jump(0xFFC).unwrap();
    handle.write_u32(0x0102_0304).unwrap();
    assert_eq!(handle.address().address(), 0x1000);
    assert_eq!(handle.address().bytes_remaining(), 0, "cursor sits at the range end");

    // The next write starts in the adjacent device and adopts its endianness.
    handle.jump(0x1000).unwrap();
    handle.write_u16(0x1234).unwrap();
    handle.jump(0x1000).unwrap();
    let mut raw = [0u8; 2];
    handle.read_bytes(&mut raw).unwrap();
    assert_eq!(raw, [0x12, 0x34], "big-endian device stores MSB first");
}

#[test]
fn unregister_at_drops_device_and_overlays() {
    let bus = DeviceBus::new(32);
    bus.register_device(memory("ram", 0x1000, Endianness::Little), 0x8000)
        .unwrap();
    bus.redirect(0x0, 0x40, 0x8000).unwrap();
    assert!(bus.resolve(0x20).is_ok());

    bus.unregister_at(0x8000).unwrap();
    assert!(bus.resolve(0x8000).is_err());
    assert!(
        bus.resolve(0x20).is_err(),
        "overlays targeting the removed device disappear with it"
    );
    assert_eq!(bus.device_count(), 0);
}
