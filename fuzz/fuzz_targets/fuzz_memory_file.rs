#![no_main]
use libfuzzer_sys::{fuzz_target, arbitrary::{Arbitrary, Unstructured}};
use vfs_bridge::MemoryFile;

#[derive(Debug, Arbitrary)]
enum FileOp {
    Write { offset: u16, data: Vec<u8> },
    Read { offset: u16, len: u16 },
}

// Memory file must agree with a plain Vec model
fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);

    let ops: Vec<FileOp> = match u.arbitrary() {
        Ok(ops) => ops,
        Err(_) => return,
    };

    let mut file = MemoryFile::new();
    let mut model: Vec<u8> = Vec::new();

    for op in ops.iter().take(32) {
        match op {
            FileOp::Write { offset, data } => {
                let start = *offset as usize;
                let end = start + data.len();
                if model.len() < end {
                    model.resize(end, 0);
                }
                model[start..end].copy_from_slice(data);
                file.write(*offset as u64, data);
            }
            FileOp::Read { offset, len } => {
                let mut buf = vec![0xa5u8; *len as usize];
                file.read(*offset as u64, &mut buf);
                for (i, byte) in buf.iter().enumerate() {
                    let expected = model.get(*offset as usize + i).copied().unwrap_or(0);
                    assert_eq!(*byte, expected);
                }
            }
        }
        assert_eq!(file.size(), model.len() as u64);
        assert!(file.capacity() >= model.len());
    }
});
