#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use wilc_sdio::bus::{Cmd52, Cmd53, Direction, IoFunction, SdioBus};
use wilc_sdio::settings::Config;
use wilc_sdio::{IrqLock, WilcSdio};

pub const WILC1000_ID: u32 = 0x1002a0;
pub const WILC3000_ID: u32 = 0x3000d0;

/// One observed bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Xfer {
    Cmd52 {
        direction: Direction,
        function: IoFunction,
        raw: bool,
        address: u32,
        data: u8,
    },
    Cmd53Read {
        function: IoFunction,
        address: u32,
        block_mode: bool,
        count: u32,
        block_size: u32,
    },
    Cmd53Write {
        function: IoFunction,
        address: u32,
        block_mode: bool,
        count: u32,
        block_size: u32,
        data: Vec<u8>,
    },
    ClaimIrq,
    ReleaseIrq,
}

/// Transaction log shared between a test and the bus it handed to the driver.
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<Xfer>>>);

impl Log {
    pub fn push(&self, xfer: Xfer) {
        self.0.borrow_mut().push(xfer);
    }

    /// Drains and returns everything logged so far.
    pub fn take(&self) -> Vec<Xfer> {
        self.0.borrow_mut().drain(..).collect()
    }
}

/// Scripted bus: CMD52/CMD53 reads pop canned responses (default zero) and
/// every transaction is recorded, including rejected ones.
#[derive(Default)]
pub struct MockBus {
    pub log: Log,
    cmd52_reads: HashMap<(u8, u32), VecDeque<u8>>,
    cmd53_reads: HashMap<u32, VecDeque<Vec<u8>>>,
    fail_cmd52_writes: HashSet<u32>,
    fail_cmd53_write_at: Option<usize>,
    cmd53_writes_seen: usize,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_cmd52_read(&mut self, function: IoFunction, address: u32, data: u8) {
        self.cmd52_reads
            .entry((u8::from(function), address))
            .or_default()
            .push_back(data);
    }

    pub fn queue_cmd53_read(&mut self, address: u32, data: &[u8]) {
        self.cmd53_reads
            .entry(address)
            .or_default()
            .push_back(data.to_vec());
    }

    /// Rejects every CMD52 write to `address`.
    pub fn fail_cmd52_write(&mut self, address: u32) {
        self.fail_cmd52_writes.insert(address);
    }

    /// Rejects the `index`-th CMD53 write issued on this bus.
    pub fn fail_cmd53_write_at(&mut self, index: usize) {
        self.fail_cmd53_write_at = Some(index);
    }
}

impl SdioBus for MockBus {
    type Error = ();

    fn cmd52(&mut self, cmd: &mut Cmd52) -> Result<(), ()> {
        if cmd.direction == Direction::Read {
            cmd.data = self
                .cmd52_reads
                .get_mut(&(u8::from(cmd.function), cmd.address))
                .and_then(|queue| queue.pop_front())
                .unwrap_or(0);
        }

        self.log.push(Xfer::Cmd52 {
            direction: cmd.direction,
            function: cmd.function,
            raw: cmd.raw,
            address: cmd.address,
            data: cmd.data,
        });

        if cmd.direction == Direction::Write && self.fail_cmd52_writes.contains(&cmd.address) {
            return Err(());
        }

        Ok(())
    }

    fn cmd53_read(&mut self, cmd: &Cmd53, buf: &mut [u8]) -> Result<(), ()> {
        assert_eq!(
            buf.len(),
            cmd.transfer_len(),
            "buffer does not match the command's transfer length"
        );

        if let Some(data) = self
            .cmd53_reads
            .get_mut(&cmd.address)
            .and_then(|queue| queue.pop_front())
        {
            assert_eq!(data.len(), buf.len(), "scripted response has wrong length");
            buf.copy_from_slice(&data);
        } else {
            buf.fill(0);
        }

        self.log.push(Xfer::Cmd53Read {
            function: cmd.function,
            address: cmd.address,
            block_mode: cmd.block_mode,
            count: cmd.count,
            block_size: cmd.block_size,
        });

        Ok(())
    }

    fn cmd53_write(&mut self, cmd: &Cmd53, buf: &[u8]) -> Result<(), ()> {
        assert_eq!(
            buf.len(),
            cmd.transfer_len(),
            "buffer does not match the command's transfer length"
        );

        self.log.push(Xfer::Cmd53Write {
            function: cmd.function,
            address: cmd.address,
            block_mode: cmd.block_mode,
            count: cmd.count,
            block_size: cmd.block_size,
            data: buf.to_vec(),
        });

        let index = self.cmd53_writes_seen;
        self.cmd53_writes_seen += 1;

        if self.fail_cmd53_write_at == Some(index) {
            return Err(());
        }

        Ok(())
    }

    fn claim_irq(&mut self) -> Result<(), ()> {
        self.log.push(Xfer::ClaimIrq);
        Ok(())
    }

    fn release_irq(&mut self) -> Result<(), ()> {
        self.log.push(Xfer::ReleaseIrq);
        Ok(())
    }
}

pub struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/* Log-entry shorthands (function 0 CMD52 unless noted) */

pub fn cmd52r(address: u32, data: u8) -> Xfer {
    Xfer::Cmd52 {
        direction: Direction::Read,
        function: IoFunction::Control,
        raw: false,
        address,
        data,
    }
}

pub fn cmd52r_fn1(address: u32, data: u8) -> Xfer {
    Xfer::Cmd52 {
        direction: Direction::Read,
        function: IoFunction::Data,
        raw: false,
        address,
        data,
    }
}

pub fn cmd52w(address: u32, data: u8) -> Xfer {
    Xfer::Cmd52 {
        direction: Direction::Write,
        function: IoFunction::Control,
        raw: false,
        address,
        data,
    }
}

pub fn cmd52w_raw(address: u32, data: u8) -> Xfer {
    Xfer::Cmd52 {
        direction: Direction::Write,
        function: IoFunction::Control,
        raw: true,
        address,
        data,
    }
}

/// Queues the responses a clean bring-up needs: function 1 ready on the
/// first poll and the given chip-identification value.
pub fn script_bring_up(bus: &mut MockBus, chipid: u32) {
    bus.queue_cmd52_read(IoFunction::Control, 0x3, 0x2);
    bus.queue_cmd53_read(0x10f, &chipid.to_le_bytes());
}

/// Builds a driver over a scripted bus and runs a first bring-up, leaving
/// the log empty. Additional responses can be queued on the bus beforehand
/// via the `script` closure.
pub fn init_driver(
    config: Config,
    chipid: u32,
    script: impl FnOnce(&mut MockBus),
) -> (WilcSdio<'static, MockBus>, Log) {
    let mut bus = MockBus::new();
    script_bring_up(&mut bus, chipid);
    script(&mut bus);

    let log = bus.log.clone();
    let lock: &'static IrqLock = Box::leak(Box::new(IrqLock::new()));

    let mut sdio = WilcSdio::new(bus, lock, config);
    sdio.init(false, &mut NoopDelay).expect("bring-up failed");
    log.take();

    (sdio, log)
}
