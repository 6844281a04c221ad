//! Deferred handlers: requests answered on a later turn of the control loop

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::Duration;
use vfs_bridge::{
    register_vfs, AccessRequest, BridgeConfigBuilder, BridgeError, Control, Database,
    DeferredStorageHandler, DeleteRequest, FileRole, Handlers, MemoryStorage, ReadRequest,
    SizeRequest, StorageHandler, WriteRequest,
};

/// Answers every request one turn later, from memory
#[derive(Clone, Default)]
struct LaterMemory {
    store: MemoryStorage,
    answered: Rc<Cell<usize>>,
}

impl LaterMemory {
    fn later<F>(&self, cx: &Control, answer: F)
    where
        F: FnOnce(&Control, &mut MemoryStorage) + 'static,
    {
        let mut store = self.store.clone();
        let answered = Rc::clone(&self.answered);
        cx.defer(move |cx| {
            answer(cx, &mut store);
            answered.set(answered.get() + 1);
        });
    }
}

impl DeferredStorageHandler for LaterMemory {
    fn access(&mut self, cx: &Control, request: AccessRequest) {
        self.later(cx, move |cx, store| {
            let exists = store.access(cx, request.role());
            request.respond(exists);
        });
    }

    fn size(&mut self, cx: &Control, request: SizeRequest) {
        self.later(cx, move |cx, store| {
            let size = store.size(cx, request.role());
            request.respond(size);
        });
    }

    fn read(&mut self, cx: &Control, mut request: ReadRequest) {
        self.later(cx, move |cx, store| {
            let (role, offset) = (request.role(), request.offset());
            store.read(cx, role, request.buffer_mut(), offset);
            request.done();
        });
    }

    fn write(&mut self, cx: &Control, request: WriteRequest) {
        self.later(cx, move |cx, store| {
            store.write(cx, request.role(), request.buffer(), request.offset());
            request.done();
        });
    }

    fn delete(&mut self, cx: &Control, request: DeleteRequest) {
        self.later(cx, move |cx, store| {
            store.delete(cx, request.role());
            request.done();
        });
    }
}

/// Drops every request without answering
struct Forgetful {
    dropped: Rc<Cell<usize>>,
}

impl Forgetful {
    fn forget(&self) {
        self.dropped.set(self.dropped.get() + 1);
    }
}

impl DeferredStorageHandler for Forgetful {
    fn access(&mut self, _cx: &Control, _request: AccessRequest) {
        self.forget();
    }

    fn size(&mut self, _cx: &Control, _request: SizeRequest) {
        self.forget();
    }

    fn read(&mut self, _cx: &Control, _request: ReadRequest) {
        self.forget();
    }

    fn write(&mut self, _cx: &Control, _request: WriteRequest) {
        self.forget();
    }

    fn delete(&mut self, _cx: &Control, _request: DeleteRequest) {
        self.forget();
    }
}

fn control() -> Control {
    let config = BridgeConfigBuilder::new().worker_threads(1).build().unwrap();
    Control::new(config).unwrap()
}

#[test]
fn test_sqlite_round_trip_through_deferred_answers() {
    let cx = control();
    let handler = LaterMemory::default();
    let vfs = register_vfs(&cx, Handlers::deferred(handler.clone())).unwrap();

    let rows = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&rows);
    let db = Database::init(&cx, move |_, values, _| sink.borrow_mut().push(values.to_vec()));

    cx.block_on(db.open("later.db", &vfs)).unwrap();
    cx.block_on(db.exec(
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);
         INSERT INTO notes (body) VALUES ('first'), ('second');",
    ))
    .unwrap();
    cx.block_on(db.exec("SELECT body FROM notes ORDER BY id")).unwrap();

    assert_eq!(
        *rows.borrow(),
        vec![vec![Some("first".to_string())], vec![Some("second".to_string())]]
    );
    assert!(handler.answered.get() > 0);
    assert!(handler.store.file_size(FileRole::Primary) > 0);

    cx.block_on(db.close()).unwrap();
    vfs.unregister().unwrap();
}

#[test]
fn test_request_parked_across_turns() {
    let cx = control();
    let parked: Rc<RefCell<Option<SizeRequest>>> = Rc::default();

    struct Parking(Rc<RefCell<Option<SizeRequest>>>);
    impl DeferredStorageHandler for Parking {
        fn access(&mut self, _cx: &Control, request: AccessRequest) {
            request.respond(false);
        }
        fn size(&mut self, _cx: &Control, request: SizeRequest) {
            *self.0.borrow_mut() = Some(request);
        }
        fn read(&mut self, _cx: &Control, request: ReadRequest) {
            request.done();
        }
        fn write(&mut self, _cx: &Control, request: WriteRequest) {
            request.done();
        }
        fn delete(&mut self, _cx: &Control, request: DeleteRequest) {
            request.done();
        }
    }

    let vfs = register_vfs(&cx, Handlers::deferred(Parking(Rc::clone(&parked)))).unwrap();
    let client = vfs.client();
    let caller = thread::spawn(move || client.size(FileRole::Wal));

    assert!(cx.run_until(Duration::from_secs(10), || parked.borrow().is_some()));

    // Parked: the caller stays blocked through more turns
    cx.turn_timeout(Duration::from_millis(50));
    assert!(!caller.is_finished());

    let request = parked.borrow_mut().take().unwrap();
    assert_eq!(request.role(), FileRole::Wal);
    request.respond(4096);

    assert_eq!(caller.join().unwrap().unwrap(), 4096);
}

#[test]
fn test_dropped_request_wakes_caller() {
    let cx = control();
    let dropped = Rc::new(Cell::new(0));
    let vfs = register_vfs(
        &cx,
        Handlers::deferred(Forgetful {
            dropped: Rc::clone(&dropped),
        }),
    )
    .unwrap();

    let client = vfs.client();
    let caller = thread::spawn(move || {
        let mut buf = [0xffu8; 16];
        let read = client.read(FileRole::Primary, &mut buf, 0);
        (read, client.access(FileRole::Journal))
    });

    assert!(cx.run_until(Duration::from_secs(10), || dropped.get() == 2));
    let (read, access) = caller.join().unwrap();
    assert!(matches!(read, Err(BridgeError::Disconnected)));
    assert!(matches!(access, Err(BridgeError::Disconnected)));
}
