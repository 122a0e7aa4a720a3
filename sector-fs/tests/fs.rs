use std::sync::Arc;
use std::thread;

use block_dev::{BlockDevice, RamDisk};
use sector_fs::{Error, FileSystem, StatKind, SynchDisk};
use sector_fs::{MAX_FILE_SIZE, NUM_DIR_ENTRIES, NUM_SECTORS, SECTOR_SIZE};

fn formatted() -> (Arc<RamDisk>, FileSystem) {
    let ram = Arc::new(RamDisk::new(NUM_SECTORS));
    let device: Arc<dyn BlockDevice> = ram.clone();
    let fs = FileSystem::format(Arc::new(SynchDisk::new(device))).unwrap();
    (ram, fs)
}

#[test]
fn format_leaves_an_empty_root() {
    let (_, fs) = formatted();

    // 两个 inode、一个位图扇区、四个目录表扇区
    assert_eq!(fs.free_sectors(), NUM_SECTORS - 7);

    let mut out = String::new();
    fs.list(&mut out).unwrap();
    assert!(out.is_empty());
}

#[test]
fn create_write_read() {
    let (_, fs) = formatted();
    fs.create("hello", 0).unwrap();

    let mut file = fs.open("hello").unwrap();
    assert_eq!(file.length(), 0);
    assert_eq!(file.write(b"hello, ").unwrap(), 7);
    assert_eq!(file.write(b"sectors").unwrap(), 7);
    assert_eq!(file.length(), 14);

    file.seek(0);
    let mut buf = [0; 32];
    assert_eq!(file.read(&mut buf), 14);
    assert_eq!(&buf[..14], b"hello, sectors");
    assert_eq!(file.read(&mut buf), 0);
}

#[test]
fn writes_grow_past_the_direct_slots() {
    let (_, fs) = formatted();
    fs.create("big", 0).unwrap();
    let free = fs.free_sectors();

    let data: Vec<u8> = (0..20 * SECTOR_SIZE).map(|i| (i % 251) as u8).collect();
    let mut file = fs.open("big").unwrap();
    for chunk in data.chunks(10) {
        assert_eq!(file.write(chunk).unwrap(), chunk.len());
    }

    let stat = fs.stat("big").unwrap();
    assert_eq!(stat.size, data.len());
    assert_eq!(stat.sectors, 20);
    assert_eq!(free - fs.free_sectors(), 21);

    let mut back = vec![0; data.len()];
    assert_eq!(file.read_at(&mut back, 0), data.len());
    assert_eq!(back, data);
}

#[test]
fn write_past_the_end_leaves_a_zero_hole() {
    let (_, fs) = formatted();
    fs.create("holey", 4).unwrap();

    let file = fs.open("holey").unwrap();
    file.write_at(b"tail", 300).unwrap();
    assert_eq!(file.length(), 304);

    let mut buf = vec![0xff; 304];
    file.read_at(&mut buf, 0);
    assert!(buf[..300].iter().all(|&b| b == 0));
    assert_eq!(&buf[300..], b"tail");
}

#[test]
fn oversized_write_fails_without_growing() {
    let (_, fs) = formatted();
    fs.create("f", 10).unwrap();
    let free = fs.free_sectors();

    let file = fs.open("f").unwrap();
    assert_eq!(file.write_at(b"x", MAX_FILE_SIZE), Err(Error::FileTooLarge));
    assert_eq!(file.length(), 10);
    assert_eq!(fs.free_sectors(), free);
}

#[test]
fn seek_to_the_end_of_the_address_space() {
    let (_, fs) = formatted();
    fs.create("far", 5).unwrap();
    let free = fs.free_sectors();

    let mut file = fs.open("far").unwrap();
    file.seek(usize::MAX);
    assert_eq!(file.read(&mut [0; 4]), 0);
    assert_eq!(file.write(b"ab"), Err(Error::FileTooLarge));
    assert_eq!(file.position(), usize::MAX);
    assert_eq!(file.length(), 5);
    assert_eq!(fs.free_sectors(), free);
}

#[test]
fn remove_returns_every_sector() {
    let (_, fs) = formatted();
    let free = fs.free_sectors();

    fs.create("f", 15 * SECTOR_SIZE).unwrap();
    assert_eq!(free - fs.free_sectors(), 1 + 15 + 1);

    fs.remove("f").unwrap();
    assert_eq!(fs.free_sectors(), free);
    assert_eq!(fs.open("f").err(), Some(Error::NotFound));
    assert_eq!(fs.remove("f"), Err(Error::NotFound));
}

#[test]
fn removed_name_can_be_created_again() {
    let (_, fs) = formatted();
    let free = fs.free_sectors();

    fs.create("again", 3 * SECTOR_SIZE).unwrap();
    fs.open("again").unwrap().write(b"old").unwrap();
    fs.remove("again").unwrap();
    assert_eq!(fs.free_sectors(), free);

    fs.create("again", 0).unwrap();
    let file = fs.open("again").unwrap();
    assert_eq!(file.length(), 0);
    assert_eq!(fs.stat("again").unwrap().sectors, 0);
}

#[test]
fn failed_create_changes_nothing() {
    let (_, fs) = formatted();
    fs.create("a", 0).unwrap();
    let free = fs.free_sectors();

    assert_eq!(fs.create("a", 10), Err(Error::AlreadyExists));
    assert_eq!(fs.create("waytoolong", 10), Err(Error::NameTooLong));
    assert_eq!(fs.create("b", MAX_FILE_SIZE + 1), Err(Error::FileTooLarge));
    assert_eq!(fs.create("nodir/b", 0), Err(Error::NotFound));
    assert_eq!(fs.create("a/b", 0), Err(Error::NotADirectory));
    assert_eq!(fs.free_sectors(), free);
}

#[test]
fn directory_fills_up() {
    let (_, fs) = formatted();
    for i in 0..NUM_DIR_ENTRIES {
        fs.create(&format!("f{i}"), 0).unwrap();
    }
    let free = fs.free_sectors();

    assert_eq!(fs.create("extra", 0), Err(Error::DirectoryFull));
    assert_eq!(fs.free_sectors(), free);

    fs.remove("f3").unwrap();
    fs.create("extra", 0).unwrap();
}

#[test]
fn disk_fills_up() {
    let (_, fs) = formatted();
    let mut created = 0;
    loop {
        match fs.mkdir(&format!("d{created}")) {
            Ok(()) => created += 1,
            Err(Error::DirectoryFull) => break,
            Err(err) => panic!("unexpected {err}"),
        }
    }

    // 每个子目录再塞满最大的文件，直到空间耗尽
    let mut failed = None;
    'outer: for d in 0..created {
        for f in 0..NUM_DIR_ENTRIES {
            if let Err(err) = fs.create(&format!("d{d}/f{f}"), MAX_FILE_SIZE) {
                failed = Some(err);
                break 'outer;
            }
        }
    }
    assert_eq!(failed, Some(Error::NoSpace));
    assert!(fs.free_sectors() < 1 + MAX_FILE_SIZE / SECTOR_SIZE + 1);
}

#[test]
fn nested_directories() {
    let (_, fs) = formatted();
    fs.mkdir("usr").unwrap();
    fs.mkdir("usr/bin").unwrap();
    fs.create("usr/bin/ls", 0).unwrap();

    let mut file = fs.open("/usr/bin/ls").unwrap();
    file.write(b"listing").unwrap();

    assert_eq!(fs.stat("usr").unwrap().kind, StatKind::DIR);
    assert_eq!(fs.stat("usr/bin/ls").unwrap().kind, StatKind::FILE);
    assert_eq!(fs.stat("usr/bin/ls").unwrap().size, 7);
    assert_eq!(fs.open("usr/bin").err(), Some(Error::IsADirectory));

    let mut out = String::new();
    fs.list(&mut out).unwrap();
    assert!(out.contains("Name: usr, "));
    assert!(out.contains("    Name: ls, "));
    assert!(out.contains("Path: root/usr/bin/ls"));
}

#[test]
fn remove_refuses_open_files_and_full_directories() {
    let (_, fs) = formatted();
    fs.mkdir("d").unwrap();
    fs.create("d/f", 3).unwrap();

    assert_eq!(fs.remove("d"), Err(Error::DirectoryNotEmpty));

    let file = fs.open("d/f").unwrap();
    assert_eq!(fs.remove("d/f"), Err(Error::Busy));
    drop(file);

    fs.remove("d/f").unwrap();
    fs.remove("d").unwrap();
    assert_eq!(fs.free_sectors(), NUM_SECTORS - 7);
}

#[test]
fn mount_sees_formatted_contents() {
    let (ram, fs) = formatted();
    fs.mkdir("keep").unwrap();
    fs.create("keep/data", 0).unwrap();
    fs.open("keep/data")
        .unwrap()
        .write(b"persisted")
        .unwrap();
    let free = fs.free_sectors();
    drop(fs);

    let device: Arc<dyn BlockDevice> = ram;
    let fs = FileSystem::mount(Arc::new(SynchDisk::new(device))).unwrap();
    assert_eq!(fs.free_sectors(), free);

    let file = fs.open("keep/data").unwrap();
    let mut buf = [0; 9];
    assert_eq!(file.read_at(&mut buf, 0), 9);
    assert_eq!(&buf, b"persisted");
}

#[test]
fn mount_rejects_a_blank_disk() {
    let device: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(NUM_SECTORS));
    let mounted = FileSystem::mount(Arc::new(SynchDisk::new(device)));
    assert!(matches!(mounted, Err(Error::NotFormatted)));
}

#[test]
fn timestamps_are_recorded() {
    let (_, fs) = formatted();
    fs.create("t", 4).unwrap();

    let stat = fs.stat("t").unwrap();
    assert!(!stat.created.as_str().is_empty());
    assert!(!stat.accessed.as_str().is_empty());
    assert!(!stat.modified.as_str().is_empty());
}

#[test]
fn handles_share_growth() {
    let (_, fs) = formatted();
    fs.create("shared", 0).unwrap();

    let writer = fs.open("shared").unwrap();
    let reader = fs.open("shared").unwrap();
    writer.write_at(b"abc", 0).unwrap();

    let mut buf = [0; 3];
    assert_eq!(reader.read_at(&mut buf, 0), 3);
    assert_eq!(&buf, b"abc");
}

#[test]
fn concurrent_appenders_on_distinct_files() {
    let (_, fs) = formatted();
    let fs = Arc::new(fs);
    for i in 0..4 {
        fs.create(&format!("w{i}"), 0).unwrap();
    }

    let workers: Vec<_> = (0..4u8)
        .map(|i| {
            let fs = fs.clone();
            thread::spawn(move || {
                let mut file = fs.open(&format!("w{i}")).unwrap();
                for _ in 0..30 {
                    file.write(&[b'a' + i; 10]).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for i in 0..4u8 {
        let file = fs.open(&format!("w{i}")).unwrap();
        let mut buf = vec![0; 300];
        assert_eq!(file.read_at(&mut buf, 0), 300);
        assert!(buf.iter().all(|&b| b == b'a' + i));
    }
}

#[test]
fn print_dumps_file_contents() {
    let (_, fs) = formatted();
    fs.create("p", 0).unwrap();
    fs.open("p").unwrap().write(b"abc\n").unwrap();

    let mut out = String::new();
    fs.print(&mut out).unwrap();
    assert!(out.contains("Bitmap set:"));
    assert!(out.contains("Name: p, "));
    assert!(out.contains("abc\\a"));
}
