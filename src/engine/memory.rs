//! Deterministic in-memory engine
//!
//! Keeps a directory tree of absolute paths in memory and follows the
//! native status conventions of the io_uring engine. Tests use it to
//! observe things a real filesystem hides: how many descriptors are still
//! open, how many native calls were submitted, and what happens when a
//! given primitive fails or completes out of order.
//!
//! Permission bits are recorded but never enforced.

use super::{Descriptor, Engine, NativeCallback, StatRecord};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

/// Native primitives, for fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Mkdir,
    Rmdir,
    Scandir,
    Open,
    Write,
    Close,
    Read,
    Rename,
    Chmod,
    Chown,
    Unlink,
    Ftruncate,
    Stat,
    Fstat,
    Sendfile,
}

/// Block size reported by stat
const BLOCK_SIZE: u64 = 4096;

/// Device number reported by stat
const DEVICE: u64 = 0x4d45_4d00;

/// Largest file the tree holds; writes or truncations past it fail with
/// `EFBIG`, as they would past a filesystem's maximum file size
const MAX_FILE_SIZE: u64 = 1 << 30;

/// Byte length of a file spanning `start..start + len`, if within
/// [`MAX_FILE_SIZE`]
fn file_end(start: u64, len: usize) -> Status<usize> {
    let end = start
        .checked_add(len as u64)
        .filter(|&end| end <= MAX_FILE_SIZE)
        .ok_or(-libc::EFBIG)?;
    usize::try_from(end).map_err(|_| -libc::EFBIG)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Directory,
}

struct Inode {
    kind: Kind,
    data: Vec<u8>,
    mode: u32,
    uid: u32,
    gid: u32,
    accessed: SystemTime,
    modified: SystemTime,
    changed: SystemTime,
    created: SystemTime,
}

impl Inode {
    fn new(kind: Kind, mode: u32) -> Self {
        let now = SystemTime::now();
        Self {
            kind,
            data: Vec::new(),
            mode: mode & 0o7777,
            uid: 0,
            gid: 0,
            accessed: now,
            modified: now,
            changed: now,
            created: now,
        }
    }

    fn touch(&mut self) {
        let now = SystemTime::now();
        self.modified = now;
        self.changed = now;
    }

    fn record(&self, ino: u64) -> StatRecord {
        let (type_bits, nlink) = match self.kind {
            Kind::File => (libc::S_IFREG, 1),
            Kind::Directory => (libc::S_IFDIR, 2),
        };
        let size = self.data.len() as u64;
        StatRecord {
            dev: DEVICE,
            ino,
            mode: type_bits | self.mode,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            size,
            blksize: BLOCK_SIZE,
            blocks: size.div_ceil(512),
            accessed: self.accessed,
            modified: self.modified,
            changed: self.changed,
            created: Some(self.created),
        }
    }
}

struct OpenFile {
    ino: u64,
    readable: bool,
    writable: bool,
    append: bool,
    position: u64,
}

struct Tree {
    names: HashMap<PathBuf, u64>,
    inodes: HashMap<u64, Inode>,
    next_ino: u64,
    descriptors: HashMap<i32, OpenFile>,
    next_fd: i32,
    faults: HashMap<Primitive, VecDeque<i32>>,
    submitted: usize,
    hold: bool,
    held: VecDeque<Box<dyn FnOnce()>>,
}

type Status<T> = Result<T, i32>;

impl Tree {
    fn new() -> Self {
        let mut tree = Self {
            names: HashMap::new(),
            inodes: HashMap::new(),
            next_ino: 1,
            descriptors: HashMap::new(),
            next_fd: 3,
            faults: HashMap::new(),
            submitted: 0,
            hold: false,
            held: VecDeque::new(),
        };
        tree.insert(PathBuf::from("/"), Inode::new(Kind::Directory, 0o755));
        tree
    }

    fn insert(&mut self, path: PathBuf, inode: Inode) -> u64 {
        let ino = self.next_ino;
        self.next_ino += 1;
        self.inodes.insert(ino, inode);
        self.names.insert(path, ino);
        ino
    }

    fn lookup(&self, path: &Path) -> Status<u64> {
        self.names.get(path).copied().ok_or(-libc::ENOENT)
    }

    fn inode(&self, ino: u64) -> Status<&Inode> {
        self.inodes.get(&ino).ok_or(-libc::ENOENT)
    }

    fn inode_mut(&mut self, ino: u64) -> Status<&mut Inode> {
        self.inodes.get_mut(&ino).ok_or(-libc::ENOENT)
    }

    fn kind_of(&self, path: &Path) -> Status<Kind> {
        Ok(self.inode(self.lookup(path)?)?.kind)
    }

    fn check_parent(&self, path: &Path) -> Status<()> {
        let parent = path.parent().ok_or(-libc::ENOENT)?;
        match self.kind_of(parent)? {
            Kind::Directory => Ok(()),
            Kind::File => Err(-libc::ENOTDIR),
        }
    }

    fn children<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = &'a PathBuf> + 'a {
        self.names.keys().filter(move |p| p.parent() == Some(dir))
    }

    fn descriptor(&mut self, fd: Descriptor) -> Status<&mut OpenFile> {
        self.descriptors.get_mut(&fd.as_raw()).ok_or(-libc::EBADF)
    }

    /// Drop an inode once no name or descriptor refers to it
    fn release(&mut self, ino: u64) {
        let named = self.names.values().any(|&i| i == ino);
        let open = self.descriptors.values().any(|f| f.ino == ino);
        if !named && !open {
            self.inodes.remove(&ino);
        }
    }

    fn take_fault(&mut self, primitive: Primitive) -> Option<i32> {
        self.faults.get_mut(&primitive)?.pop_front()
    }

    fn mkdir(&mut self, path: &Path, mode: u32) -> Status<i32> {
        if self.names.contains_key(path) {
            return Err(-libc::EEXIST);
        }
        self.check_parent(path)?;
        self.insert(path.to_path_buf(), Inode::new(Kind::Directory, mode));
        Ok(0)
    }

    fn rmdir(&mut self, path: &Path) -> Status<i32> {
        let ino = self.lookup(path)?;
        if self.inode(ino)?.kind != Kind::Directory {
            return Err(-libc::ENOTDIR);
        }
        if path.parent().is_none() {
            return Err(-libc::EBUSY);
        }
        if self.children(path).next().is_some() {
            return Err(-libc::ENOTEMPTY);
        }
        self.names.remove(path);
        self.release(ino);
        Ok(0)
    }

    fn scandir(&self, path: &Path) -> Status<Vec<String>> {
        if self.kind_of(path)? != Kind::Directory {
            return Err(-libc::ENOTDIR);
        }
        let mut names: Vec<String> = self
            .children(path)
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    fn open(&mut self, path: &Path, flags: i32, mode: u32) -> Status<i32> {
        let access = flags & libc::O_ACCMODE;
        let readable = access == libc::O_RDONLY || access == libc::O_RDWR;
        let writable = access == libc::O_WRONLY || access == libc::O_RDWR;

        let ino = match self.lookup(path) {
            Ok(ino) => {
                if flags & libc::O_CREAT != 0 && flags & libc::O_EXCL != 0 {
                    return Err(-libc::EEXIST);
                }
                let inode = self.inode_mut(ino)?;
                if inode.kind == Kind::Directory && writable {
                    return Err(-libc::EISDIR);
                }
                if flags & libc::O_TRUNC != 0 && writable {
                    inode.data.clear();
                    inode.touch();
                }
                ino
            }
            Err(_) if flags & libc::O_CREAT != 0 => {
                self.check_parent(path)?;
                self.insert(path.to_path_buf(), Inode::new(Kind::File, mode))
            }
            Err(status) => return Err(status),
        };

        let fd = self.next_fd;
        self.next_fd += 1;
        self.descriptors.insert(
            fd,
            OpenFile {
                ino,
                readable,
                writable,
                append: flags & libc::O_APPEND != 0,
                position: 0,
            },
        );
        Ok(fd)
    }

    fn close(&mut self, fd: Descriptor) -> Status<i32> {
        let file = self.descriptors.remove(&fd.as_raw()).ok_or(-libc::EBADF)?;
        self.release(file.ino);
        Ok(0)
    }

    fn write(&mut self, fd: Descriptor, data: &[u8], offset: u64) -> Status<isize> {
        let file = self.descriptor(fd)?;
        if !file.writable {
            return Err(-libc::EBADF);
        }
        let (ino, append) = (file.ino, file.append);
        if i64::try_from(offset).is_err() {
            return Err(-libc::EINVAL);
        }
        let inode = self.inode_mut(ino)?;
        let start = if append {
            inode.data.len() as u64
        } else {
            offset
        };
        let end = file_end(start, data.len())?;
        let start = end - data.len();
        if inode.data.len() < end {
            inode.data.resize(end, 0);
        }
        inode.data[start..end].copy_from_slice(data);
        inode.touch();
        isize::try_from(data.len()).map_err(|_| -libc::EOVERFLOW)
    }

    fn read(&mut self, fd: Descriptor, len: usize) -> Status<Vec<u8>> {
        let file = self.descriptor(fd)?;
        if !file.readable {
            return Err(-libc::EBADF);
        }
        let (ino, position) = (file.ino, file.position);
        let inode = self.inode(ino)?;
        if inode.kind == Kind::Directory {
            return Err(-libc::EISDIR);
        }
        let start = usize::try_from(position)
            .unwrap_or(usize::MAX)
            .min(inode.data.len());
        let end = start.saturating_add(len).min(inode.data.len());
        let bytes = inode.data[start..end].to_vec();
        self.descriptor(fd)?.position += bytes.len() as u64;
        Ok(bytes)
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Status<i32> {
        let source = self.lookup(from)?;
        self.check_parent(to)?;
        if from == to {
            return Ok(0);
        }
        if to.starts_with(from) {
            return Err(-libc::EINVAL);
        }
        let source_kind = self.inode(source)?.kind;
        if let Ok(target) = self.lookup(to) {
            match (source_kind, self.inode(target)?.kind) {
                (Kind::File, Kind::Directory) => return Err(-libc::EISDIR),
                (Kind::Directory, Kind::File) => return Err(-libc::ENOTDIR),
                (Kind::Directory, Kind::Directory) if self.children(to).next().is_some() => {
                    return Err(-libc::ENOTEMPTY)
                }
                _ => {}
            }
            self.names.remove(to);
            self.release(target);
        }

        let moved: Vec<PathBuf> = self
            .names
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            if let (Some(ino), Ok(rest)) = (self.names.remove(&old), old.strip_prefix(from)) {
                let new = if rest.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(rest)
                };
                self.names.insert(new, ino);
            }
        }
        self.inode_mut(source)?.changed = SystemTime::now();
        Ok(0)
    }

    fn chmod(&mut self, path: &Path, mode: u32) -> Status<i32> {
        let inode = self.inode_mut(self.lookup(path)?)?;
        inode.mode = mode & 0o7777;
        inode.changed = SystemTime::now();
        Ok(0)
    }

    fn chown(&mut self, path: &Path, uid: u32, gid: u32) -> Status<i32> {
        let inode = self.inode_mut(self.lookup(path)?)?;
        // u32::MAX is chown(2)'s "leave unchanged"
        if uid != u32::MAX {
            inode.uid = uid;
        }
        if gid != u32::MAX {
            inode.gid = gid;
        }
        inode.changed = SystemTime::now();
        Ok(0)
    }

    fn unlink(&mut self, path: &Path) -> Status<i32> {
        let ino = self.lookup(path)?;
        if self.inode(ino)?.kind == Kind::Directory {
            return Err(-libc::EISDIR);
        }
        self.names.remove(path);
        self.release(ino);
        Ok(0)
    }

    fn ftruncate(&mut self, fd: Descriptor, length: u64) -> Status<i32> {
        let file = self.descriptor(fd)?;
        if !file.writable {
            return Err(-libc::EINVAL);
        }
        let ino = file.ino;
        let length = file_end(length, 0)?;
        let inode = self.inode_mut(ino)?;
        inode.data.resize(length, 0);
        inode.touch();
        Ok(0)
    }

    fn stat(&self, path: &Path) -> Status<StatRecord> {
        let ino = self.lookup(path)?;
        Ok(self.inode(ino)?.record(ino))
    }

    fn fstat(&mut self, fd: Descriptor) -> Status<StatRecord> {
        let ino = self.descriptor(fd)?.ino;
        Ok(self.inode(ino)?.record(ino))
    }

    fn sendfile(&mut self, input: Descriptor, output: Descriptor, offset: u64, len: usize) -> Status<isize> {
        let source = self.descriptor(input)?;
        if !source.readable {
            return Err(-libc::EBADF);
        }
        let source_ino = source.ino;
        let sink = self.descriptor(output)?;
        if !sink.writable {
            return Err(-libc::EBADF);
        }
        let position = sink.position;

        let data = &self.inode(source_ino)?.data;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(len).min(data.len());
        let chunk = data[start..end].to_vec();

        let written = self.write(output, &chunk, position)?;
        self.descriptor(output)?.position += chunk.len() as u64;
        Ok(written)
    }
}

/// In-memory engine
///
/// Clones share the same tree. Callbacks run synchronously inside the
/// submitting call unless [`MemoryEngine::hold_callbacks`] is enabled, in
/// which case they queue until released.
#[derive(Clone)]
pub struct MemoryEngine {
    tree: Rc<RefCell<Tree>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = self.tree.borrow();
        f.debug_struct("MemoryEngine")
            .field("entries", &tree.names.len())
            .field("open_descriptors", &tree.descriptors.len())
            .field("held", &tree.held.len())
            .finish()
    }
}

impl MemoryEngine {
    /// Create an engine holding only the root directory
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: Rc::new(RefCell::new(Tree::new())),
        }
    }

    /// Create a directory and any missing ancestors (mode 0o755)
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut tree = self.tree.borrow_mut();
        for ancestor in path.as_ref().ancestors().collect::<Vec<_>>().into_iter().rev() {
            if !tree.names.contains_key(ancestor) {
                tree.insert(ancestor.to_path_buf(), Inode::new(Kind::Directory, 0o755));
            }
        }
    }

    /// Create or replace a file (mode 0o644), creating missing ancestors
    pub fn add_file(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        let mut tree = self.tree.borrow_mut();
        let mut inode = Inode::new(Kind::File, 0o644);
        inode.data = data.into();
        if let Some(old) = tree.names.remove(path) {
            tree.release(old);
        }
        tree.insert(path.to_path_buf(), inode);
    }

    /// Contents of a file, or `None` if `path` is missing or a directory
    #[must_use]
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let tree = self.tree.borrow();
        let inode = tree.inode(tree.lookup(path.as_ref()).ok()?).ok()?;
        (inode.kind == Kind::File).then(|| inode.data.clone())
    }

    /// Whether anything exists at `path`
    #[must_use]
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.tree.borrow().names.contains_key(path.as_ref())
    }

    /// Number of descriptors opened and not yet closed
    #[must_use]
    pub fn open_descriptors(&self) -> usize {
        self.tree.borrow().descriptors.len()
    }

    /// Number of native calls submitted so far
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.tree.borrow().submitted
    }

    /// Make the next call of `primitive` fail with `-errno`
    ///
    /// Faults queue up; each one is consumed by a single call. The failing
    /// call has no effect on the tree.
    pub fn fail_next(&self, primitive: Primitive, errno: i32) {
        self.tree
            .borrow_mut()
            .faults
            .entry(primitive)
            .or_default()
            .push_back(-errno.abs());
    }

    /// Queue callbacks instead of invoking them (`true`), or resume
    /// invoking them synchronously (`false`)
    ///
    /// Turning holding off does not release callbacks already queued.
    pub fn hold_callbacks(&self, hold: bool) {
        self.tree.borrow_mut().hold = hold;
    }

    /// Number of queued callbacks
    #[must_use]
    pub fn held_callbacks(&self) -> usize {
        self.tree.borrow().held.len()
    }

    /// Invoke the oldest queued callback; `false` if none was queued
    pub fn release_next(&self) -> bool {
        let next = self.tree.borrow_mut().held.pop_front();
        next.map(|callback| callback()).is_some()
    }

    /// Invoke the newest queued callback; `false` if none was queued
    pub fn release_last(&self) -> bool {
        let last = self.tree.borrow_mut().held.pop_back();
        last.map(|callback| callback()).is_some()
    }

    /// Invoke queued callbacks oldest first until none remain
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        while self.release_next() {
            released += 1;
        }
        released
    }

    /// Apply `operation` to the tree and hand its outcome to `callback`
    ///
    /// An injected fault replaces the operation; `failed` shapes the fault
    /// status into the callback's argument.
    fn run<A, T>(
        &self,
        primitive: Primitive,
        callback: NativeCallback<A>,
        operation: impl FnOnce(&mut Tree) -> Status<T>,
        shape: impl FnOnce(Status<T>) -> A,
    ) where
        A: 'static,
    {
        let outcome = {
            let mut tree = self.tree.borrow_mut();
            tree.submitted += 1;
            match tree.take_fault(primitive) {
                Some(status) => shape(Err(status)),
                None => shape(operation(&mut tree)),
            }
        };

        let mut tree = self.tree.borrow_mut();
        if tree.hold {
            tree.held.push_back(Box::new(move || callback(outcome)));
            return;
        }
        drop(tree);
        callback(outcome);
    }
}

fn status_only(result: Status<i32>) -> i32 {
    result.unwrap_or_else(|status| status)
}

fn count(result: Status<isize>) -> isize {
    result.unwrap_or_else(|status| status as isize)
}

fn stat_outcome(result: Status<StatRecord>) -> (i32, Option<StatRecord>) {
    match result {
        Ok(record) => (0, Some(record)),
        Err(status) => (status, None),
    }
}

impl Engine for MemoryEngine {
    fn mkdir(&self, path: &Path, mode: u32, callback: NativeCallback<i32>) {
        self.run(Primitive::Mkdir, callback, |t| t.mkdir(path, mode), status_only);
    }

    fn rmdir(&self, path: &Path, callback: NativeCallback<i32>) {
        self.run(Primitive::Rmdir, callback, |t| t.rmdir(path), status_only);
    }

    fn scandir(&self, path: &Path, _flags: i32, callback: NativeCallback<(i32, Vec<String>)>) {
        self.run(
            Primitive::Scandir,
            callback,
            |t| t.scandir(path),
            |result| match result {
                Ok(names) => (i32::try_from(names.len()).unwrap_or(i32::MAX), names),
                Err(status) => (status, Vec::new()),
            },
        );
    }

    fn open(&self, path: &Path, flags: i32, mode: u32, callback: NativeCallback<i32>) {
        self.run(Primitive::Open, callback, |t| t.open(path, flags, mode), status_only);
    }

    fn write(
        &self,
        fd: Descriptor,
        data: Vec<u8>,
        offset: u64,
        callback: NativeCallback<(Descriptor, isize)>,
    ) {
        self.run(
            Primitive::Write,
            callback,
            |t| t.write(fd, &data, offset),
            |result| (fd, count(result)),
        );
    }

    fn close(&self, fd: Descriptor, callback: NativeCallback<i32>) {
        self.run(Primitive::Close, callback, |t| t.close(fd), status_only);
    }

    fn read(&self, fd: Descriptor, len: usize, callback: NativeCallback<(Descriptor, isize, Vec<u8>)>) {
        self.run(
            Primitive::Read,
            callback,
            |t| t.read(fd, len),
            |result| match result {
                Ok(bytes) => (fd, isize::try_from(bytes.len()).unwrap_or(isize::MAX), bytes),
                Err(status) => (fd, status as isize, Vec::new()),
            },
        );
    }

    fn rename(&self, from: &Path, to: &Path, callback: NativeCallback<i32>) {
        self.run(Primitive::Rename, callback, |t| t.rename(from, to), status_only);
    }

    fn chmod(&self, path: &Path, mode: u32, callback: NativeCallback<i32>) {
        self.run(Primitive::Chmod, callback, |t| t.chmod(path, mode), status_only);
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32, callback: NativeCallback<i32>) {
        self.run(Primitive::Chown, callback, |t| t.chown(path, uid, gid), status_only);
    }

    fn unlink(&self, path: &Path, callback: NativeCallback<i32>) {
        self.run(Primitive::Unlink, callback, |t| t.unlink(path), status_only);
    }

    fn ftruncate(&self, fd: Descriptor, length: u64, callback: NativeCallback<i32>) {
        self.run(Primitive::Ftruncate, callback, |t| t.ftruncate(fd, length), status_only);
    }

    fn stat(&self, path: &Path, callback: NativeCallback<(i32, Option<StatRecord>)>) {
        self.run(Primitive::Stat, callback, |t| t.stat(path), stat_outcome);
    }

    fn fstat(&self, fd: Descriptor, callback: NativeCallback<(i32, Option<StatRecord>)>) {
        self.run(Primitive::Fstat, callback, |t| t.fstat(fd), stat_outcome);
    }

    fn sendfile(
        &self,
        input: Descriptor,
        output: Descriptor,
        offset: u64,
        len: usize,
        callback: NativeCallback<isize>,
    ) {
        self.run(
            Primitive::Sendfile,
            callback,
            |t| t.sendfile(input, output, offset, len),
            count,
        );
    }
}
