// Backing regions for ring channels.
// Heap regions serve in-process channels; /dev/shm regions let a consumer
// in another process attach to the same channel.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io;
use std::ptr;
use std::ptr::NonNull;
#[cfg(unix)]
use std::os::fd::{AsRawFd, IntoRawFd};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Alignment of every region start. Channel headers are `align(128)`.
pub const REGION_ALIGN: usize = 128;

/// A mapped, writable memory region that backs one channel.
pub trait RegionBackend: Send + Sync + Debug {
    /// Pointer to the first byte of the region, aligned to [`REGION_ALIGN`].
    fn as_ptr(&self) -> *mut u8;

    /// Size of the usable region in bytes.
    fn size(&self) -> usize;

    /// Handle identifying the region.
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy)]
pub enum RawHandle {
    /// Private heap allocation
    Heap,
    /// Unix file descriptor (Linux)
    Fd(i32),
}

#[inline]
fn align_up(size: usize) -> usize {
    (size + REGION_ALIGN - 1) & !(REGION_ALIGN - 1)
}

/// Zeroed, process-private region.
#[derive(Debug)]
pub struct HeapRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    pub fn new(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "region size must be greater than zero",
            ));
        }
        let layout = Layout::from_size_align(align_up(size), REGION_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("failed to allocate {} byte region", layout.size()),
            )
        })?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl RegionBackend for HeapRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Heap
    }
}

/// Allocate a zeroed private region of at least `size` bytes.
pub fn heap_region(size: usize) -> io::Result<Box<dyn RegionBackend>> {
    Ok(Box::new(HeapRegion::new(size)?))
}

/// Create (or truncate) a named shared memory region in `/dev/shm`.
#[cfg(target_os = "linux")]
pub fn create_shared_memory(size: usize, name: &str) -> io::Result<Box<dyn RegionBackend>> {
    Ok(Box::new(LinuxSharedMemory::create(size, name)?))
}

/// Attach to an existing named region in `/dev/shm`.
///
/// `size` is the minimum size the caller expects; the mapping covers the
/// whole file.
#[cfg(target_os = "linux")]
pub fn attach_shared_memory(name: &str, size: usize) -> io::Result<Box<dyn RegionBackend>> {
    Ok(Box::new(LinuxSharedMemory::attach(name, size)?))
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(_size: usize, _name: &str) -> io::Result<Box<dyn RegionBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_memory(_name: &str, _size: usize) -> io::Result<Box<dyn RegionBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct LinuxSharedMemory {
    ptr: NonNull<u8>,
    size: usize,
    fd: i32,
    mapping: (*mut u8, usize),
}

#[cfg(target_os = "linux")]
unsafe impl Send for LinuxSharedMemory {}
#[cfg(target_os = "linux")]
unsafe impl Sync for LinuxSharedMemory {}

#[cfg(target_os = "linux")]
impl LinuxSharedMemory {
    fn path(name: &str) -> String {
        format!("/dev/shm/{}", name)
    }

    /// Create a new shared memory region using /dev/shm
    pub fn create(size: usize, name: &str) -> io::Result<Self> {
        let path = Self::path(name);
        let size = align_up(size);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to create shared memory file at {}: {}", path, e),
                )
            })?;

        // ftruncate zero-fills, so a fresh channel header reads as all zeroes
        if unsafe { libc::ftruncate(file.as_raw_fd(), size as libc::off_t) } != 0 {
            return Err(io::Error::last_os_error());
        }

        Self::map(file.into_raw_fd(), size)
    }

    /// Attach to an existing region created by [`LinuxSharedMemory::create`].
    pub fn attach(name: &str, expected_size: usize) -> io::Result<Self> {
        let path = Self::path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Failed to open shared memory at {}: {}", path, e),
                )
            })?;

        let file_size = file.metadata()?.len() as usize;
        if file_size < expected_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Shared memory size too small: expected at least {} bytes, got {}",
                    expected_size, file_size
                ),
            ));
        }

        Self::map(file.into_raw_fd(), file_size)
    }

    fn map(fd: i32, size: usize) -> io::Result<Self> {
        // mmap returns page-aligned addresses, which satisfies REGION_ALIGN
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let raw = raw as *mut u8;
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => {
                unsafe { libc::close(fd) };
                return Err(io::Error::new(io::ErrorKind::Other, "mmap returned null"));
            }
        };

        Ok(Self {
            ptr,
            size,
            fd,
            mapping: (raw, size),
        })
    }
}

#[cfg(target_os = "linux")]
impl Drop for LinuxSharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mapping.0 as *mut libc::c_void, self.mapping.1);
            libc::close(self.fd);
        }
    }
}

#[cfg(target_os = "linux")]
impl RegionBackend for LinuxSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(self.fd)
    }
}

/// Remove a named region from `/dev/shm`. Missing regions are not an error.
#[cfg(target_os = "linux")]
pub fn unlink_shared_memory(name: &str) -> io::Result<()> {
    match std::fs::remove_file(LinuxSharedMemory::path(name)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn unlink_shared_memory(_name: &str) -> io::Result<()> {
    Ok(())
}
