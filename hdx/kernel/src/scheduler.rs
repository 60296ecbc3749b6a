//! Registration table and run loop

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use hdx_core::{ActiveObject, AoId, Context, Event, EventSink, Fault, PrioMask, Priority, LEVELS};

use crate::{KernelConfig, Mailbox, MailboxError, RegisterError, Set56, MAX_ACTIVE, SET_CAPACITY};

/// An active object as stored by the kernel
pub type Machine<'a> = &'a mut (dyn ActiveObject + Send + 'a);

#[derive(Debug, Clone, Copy)]
struct Member {
    prio: Priority,
    /// Position within the priority level, fixed at registration
    slot: u8,
    tag: u8,
}

/// Scheduling bookkeeping, only touched inside critical sections.
struct Table {
    reserved: usize,
    members: [Option<Member>; MAX_ACTIVE],
    /// Raw handles sorted by priority; each level occupies a contiguous block
    order: [u8; MAX_ACTIVE],
    registered: usize,
    offset: [u8; LEVELS],
    count: [u8; LEVELS],
    /// Members with queued events, per level
    waiting: [Set56; LEVELS],
    pending: PrioMask,
    /// Level currently being executed
    serviced: PrioMask,
}

impl Table {
    const fn new() -> Self {
        Self {
            reserved: 0,
            members: [None; MAX_ACTIVE],
            order: [0; MAX_ACTIVE],
            registered: 0,
            offset: [0; LEVELS],
            count: [0; LEVELS],
            waiting: [Set56::EMPTY; LEVELS],
            pending: PrioMask::EMPTY,
            serviced: PrioMask::EMPTY,
        }
    }

    fn member(&self, id: AoId) -> Option<Member> {
        if id.index() < self.reserved {
            self.members[id.index()]
        } else {
            None
        }
    }

    fn id_at(&self, prio: Priority, slot: usize) -> AoId {
        AoId::new(self.order[self.offset[prio.index()] as usize + slot])
    }

    /// Insert `id` at the end of its priority block, shifting lower levels.
    fn insert(&mut self, id: AoId, prio: Priority, tag: u8) -> Result<(), RegisterError> {
        if id.index() >= self.reserved {
            return Err(RegisterError::UnknownHandle(id));
        }
        if self.members[id.index()].is_some() {
            return Err(RegisterError::AlreadyRegistered(id));
        }
        let level = prio.index();
        if self.count[level] as usize >= SET_CAPACITY {
            return Err(RegisterError::LevelFull(prio));
        }

        let pos = self.offset[level] as usize + self.count[level] as usize;
        let mut i = self.registered;
        while i > pos {
            self.order[i] = self.order[i - 1];
            i -= 1;
        }
        self.order[pos] = id.raw();
        self.registered += 1;
        for lower in level + 1..LEVELS {
            self.offset[lower] += 1;
        }

        self.members[id.index()] = Some(Member {
            prio,
            slot: self.count[level],
            tag,
        });
        self.count[level] += 1;
        Ok(())
    }
}

struct Slot<'a> {
    mailbox: Mutex<RefCell<Option<Mailbox<'a>>>>,
    /// Empty while the object is executing
    machine: Mutex<RefCell<Option<Machine<'a>>>>,
}

impl<'a> Slot<'a> {
    fn new() -> Self {
        Self {
            mailbox: Mutex::new(RefCell::new(None)),
            machine: Mutex::new(RefCell::new(None)),
        }
    }
}

enum Plan<'a> {
    Run(Machine<'a>, PrioMask),
    Queue,
}

/// The scheduler context.
///
/// One instance per core, created explicitly at start-up and shared by
/// reference with everything that posts events. Active objects and their
/// mailbox storage are borrowed for the kernel's lifetime.
pub struct Kernel<'a> {
    config: KernelConfig,
    table: Mutex<RefCell<Table>>,
    slots: [Slot<'a>; MAX_ACTIVE],
    fault: Mutex<Cell<Option<Fault>>>,
}

impl<'a> Kernel<'a> {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            table: Mutex::new(RefCell::new(Table::new())),
            slots: core::array::from_fn(|_| Slot::new()),
            fault: Mutex::new(Cell::new(None)),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Hand out the next handle without registering anything yet.
    ///
    /// Lets objects that refer to each other learn their handles before
    /// [`register_reserved`](Self::register_reserved) runs. Posting to a
    /// reserved but unregistered handle is a fault.
    pub fn reserve(&self) -> Result<AoId, RegisterError> {
        let capacity = self.config.capacity();
        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            if table.reserved >= capacity {
                return Err(RegisterError::TableFull);
            }
            let id = AoId::new(table.reserved as u8);
            table.reserved += 1;
            Ok(id)
        })
    }

    /// Register an active object with its mailbox storage at `priority`.
    ///
    /// The object's initial transition runs before this returns.
    pub fn register(
        &self,
        machine: Machine<'a>,
        storage: &'a mut [Event],
        priority: u8,
    ) -> Result<AoId, RegisterError> {
        let prio = Priority::new(priority).ok_or(RegisterError::InvalidPriority(priority))?;
        let id = self.reserve()?;
        self.register_reserved(id, machine, storage, prio.raw())
    }

    /// Register an object under a handle obtained from [`reserve`](Self::reserve).
    pub fn register_reserved(
        &self,
        id: AoId,
        machine: Machine<'a>,
        storage: &'a mut [Event],
        priority: u8,
    ) -> Result<AoId, RegisterError> {
        let prio = Priority::new(priority).ok_or(RegisterError::InvalidPriority(priority))?;
        let mailbox = Mailbox::new(storage).map_err(|e| match e {
            MailboxError::TooLarge(n) => RegisterError::MailboxTooLarge(n),
            _ => RegisterError::MissingMailbox,
        })?;
        let tag = machine.type_tag();

        critical_section::with(|cs| -> Result<(), RegisterError> {
            self.table.borrow_ref_mut(cs).insert(id, prio, tag)?;
            *self.slots[id.index()].mailbox.borrow_ref_mut(cs) = Some(mailbox);
            Ok(())
        })?;
        log::debug!("{}: registered {} at {} (tag {})", self.config.name, id, prio, tag);

        machine.start(&Context::new(self, id));
        critical_section::with(|cs| {
            *self.slots[id.index()].machine.borrow_ref_mut(cs) = Some(machine);
        });
        Ok(id)
    }

    pub fn is_registered(&self, id: AoId) -> bool {
        self.priority_of(id).is_some()
    }

    pub fn priority_of(&self, id: AoId) -> Option<Priority> {
        critical_section::with(|cs| self.table.borrow_ref(cs).member(id).map(|m| m.prio))
    }

    pub fn type_tag(&self, id: AoId) -> Option<u8> {
        critical_section::with(|cs| self.table.borrow_ref(cs).member(id).map(|m| m.tag))
    }

    /// Index of `id` in the priority-sorted schedule
    pub fn schedule_position(&self, id: AoId) -> Option<usize> {
        critical_section::with(|cs| {
            let table = self.table.borrow_ref(cs);
            let member = table.member(id)?;
            Some(table.offset[member.prio.index()] as usize + member.slot as usize)
        })
    }

    /// Number of registered objects
    pub fn registered(&self) -> usize {
        critical_section::with(|cs| self.table.borrow_ref(cs).registered)
    }

    /// Events queued for `id`
    pub fn pending_events(&self, id: AoId) -> usize {
        critical_section::with(|cs| {
            if self.table.borrow_ref(cs).member(id).is_none() {
                return 0;
            }
            self.slots[id.index()]
                .mailbox
                .borrow_ref(cs)
                .as_ref()
                .map_or(0, |mb| mb.len())
        })
    }

    /// True while any level has queued events
    pub fn is_busy(&self) -> bool {
        critical_section::with(|cs| !self.table.borrow_ref(cs).pending.is_empty())
    }

    /// First fatal condition seen, if any
    pub fn fault(&self) -> Option<Fault> {
        critical_section::with(|cs| self.fault.borrow(cs).get())
    }

    fn raise(&self, fault: Fault) {
        log::error!("{}: {}", self.config.name, fault);
        critical_section::with(|cs| {
            let cell = self.fault.borrow(cs);
            if cell.get().is_none() {
                cell.set(Some(fault));
            }
        });
    }

    fn check_fault(&self) -> Result<(), Fault> {
        match self.fault() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Queue `event` for `target`. Never runs the target.
    pub fn post(&self, target: AoId, event: Event) -> Result<(), Fault> {
        let result = critical_section::with(|cs| -> Result<(), Fault> {
            let mut table = self.table.borrow_ref_mut(cs);
            let member = table.member(target).ok_or(Fault::UnknownTarget(target))?;
            let mut mailbox = self.slots[target.index()].mailbox.borrow_ref_mut(cs);
            mailbox
                .as_mut()
                .ok_or(Fault::UnknownTarget(target))?
                .push(event)
                .map_err(|_| Fault::MailboxOverflow(target))?;
            table.waiting[member.prio.index()].insert(member.slot as usize);
            table.pending.insert(member.prio);
            Ok(())
        });
        if let Err(fault) = result {
            self.raise(fault);
        }
        result
    }

    /// Run `target` on `event` right away if it outranks the level being
    /// serviced, otherwise queue it like [`post`](Self::post).
    pub fn dispatch(&self, target: AoId, event: Event) -> Result<(), Fault> {
        let plan = critical_section::with(|cs| -> Result<Plan<'a>, Fault> {
            let mut table = self.table.borrow_ref_mut(cs);
            let member = table.member(target).ok_or(Fault::UnknownTarget(target))?;
            let mask = member.prio.mask();
            if mask <= table.serviced {
                return Ok(Plan::Queue);
            }
            match self.slots[target.index()].machine.borrow_ref_mut(cs).take() {
                Some(machine) => {
                    let previous = table.serviced;
                    table.serviced = mask;
                    Ok(Plan::Run(machine, previous))
                }
                None => Ok(Plan::Queue),
            }
        });

        match plan {
            Ok(Plan::Queue) => self.post(target, event),
            Ok(Plan::Run(machine, previous)) => {
                machine.dispatch(&Context::new(self, target), event);
                critical_section::with(|cs| {
                    *self.slots[target.index()].machine.borrow_ref_mut(cs) = Some(machine);
                    self.table.borrow_ref_mut(cs).serviced = previous;
                });
                Ok(())
            }
            Err(fault) => {
                self.raise(fault);
                Err(fault)
            }
        }
    }

    /// Dispatch queued events until every mailbox is empty.
    ///
    /// Must be called from the foreground only, never from a state handler.
    pub fn run_until_idle(&self) -> Result<(), Fault> {
        loop {
            self.check_fault()?;
            let next = critical_section::with(|cs| {
                let mut table = self.table.borrow_ref_mut(cs);
                let next = table.pending.highest();
                table.serviced = next.map_or(PrioMask::EMPTY, Priority::mask);
                next
            });
            match next {
                Some(prio) => self.service_level(prio)?,
                None => return self.check_fault(),
            }
        }
    }

    /// The scheduling loop. Returns only when a fault is raised.
    pub fn run(&self) -> Fault {
        loop {
            if let Err(fault) = self.run_until_idle() {
                return fault;
            }
            self.idle();
        }
    }

    fn idle(&self) {
        match self.config.idle_callback {
            Some(callback) => callback(),
            None => wait_for_interrupt(),
        }
    }

    /// Round-robin over one level until it drains or a more urgent level
    /// becomes pending.
    fn service_level(&self, prio: Priority) -> Result<(), Fault> {
        loop {
            let round = critical_section::with(|cs| {
                let mut table = self.table.borrow_ref_mut(cs);
                let round = table.waiting[prio.index()];
                if round.is_empty() {
                    table.pending.remove(prio);
                }
                round
            });
            if round.is_empty() {
                return Ok(());
            }
            for slot in round.iter() {
                let preempted = critical_section::with(|cs| {
                    self.table.borrow_ref(cs).pending.preempts(prio.mask())
                });
                if preempted {
                    return Ok(());
                }
                self.dispatch_one(prio, slot)?;
            }
        }
    }

    fn dispatch_one(&self, prio: Priority, slot: usize) -> Result<(), Fault> {
        let taken = critical_section::with(|cs| -> Result<Option<(AoId, Event, Machine<'a>)>, Fault> {
            let table = self.table.borrow_ref(cs);
            if !table.waiting[prio.index()].contains(slot) {
                return Ok(None);
            }
            let id = table.id_at(prio, slot);
            let entry = &self.slots[id.index()];
            let event = entry
                .mailbox
                .borrow_ref(cs)
                .as_ref()
                .and_then(|mb| mb.peek().ok())
                .ok_or(Fault::MailboxUnreadable(id))?;
            let machine = entry
                .machine
                .borrow_ref_mut(cs)
                .take()
                .ok_or(Fault::Reentered(id))?;
            Ok(Some((id, event, machine)))
        });

        let (id, event, machine) = match taken {
            Ok(Some(taken)) => taken,
            Ok(None) => return Ok(()),
            Err(fault) => {
                self.raise(fault);
                return Err(fault);
            }
        };

        machine.dispatch(&Context::new(self, id), event);

        critical_section::with(|cs| {
            let entry = &self.slots[id.index()];
            *entry.machine.borrow_ref_mut(cs) = Some(machine);
            let drained = match entry.mailbox.borrow_ref_mut(cs).as_mut() {
                Some(mb) => mb.consume().is_ok() && mb.is_empty(),
                None => true,
            };
            if drained {
                self.table.borrow_ref_mut(cs).waiting[prio.index()].remove(slot);
            }
        });
        self.check_fault()
    }
}

impl EventSink for Kernel<'_> {
    fn post(&self, target: AoId, event: Event) -> Result<(), Fault> {
        Kernel::post(self, target, event)
    }

    fn dispatch(&self, target: AoId, event: Event) -> Result<(), Fault> {
        Kernel::dispatch(self, target, event)
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn wait_for_interrupt() {
    core::hint::spin_loop();
}
