//! The memory manager: program admission, frame allocation, translation,
//! page-fault servicing, and eviction.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use crate::error::SystemCode;
use crate::memory::paging::PageTableEntry;
use crate::memory::physical::PhysicalMemory;
use crate::process::pcb::{Pcb, ProgramLayout};

/// The parsed 12-byte program header plus the derived code/data layout
/// described in §3 ("Program Header", "Program Image").
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub byte_size: u32,
    pub entry_pc: u32,
    pub loader_base: u32,
    pub layout: ProgramLayout,
    /// The program image bytes, i.e. everything after the 12-byte header.
    pub image: Vec<u8>,
}

/// Which frame, owned by which process and virtual page, backs a resident
/// page. Tracked independently of any single [`Pcb`]'s page table so the
/// clock hand can sweep physical frames without needing a live reference
/// into every process at once.
#[derive(Debug, Clone, Copy)]
struct FrameOwner {
    pid: u64,
    vp: u32,
}

/// Owns physical memory, the free-frame pool, and every process's backing
/// store (the full program image, demand-paged into frames on fault).
#[derive(Debug)]
pub struct MemoryManager {
    page_size: usize,
    default_page_limit: usize,
    physical: PhysicalMemory,
    num_frames: u32,
    free_frames: VecDeque<u32>,
    frame_owner: Vec<Option<FrameOwner>>,
    /// Rotating hand for the clock/second-chance eviction algorithm
    /// (§4.1.1), indexing into `frame_owner`.
    clock_hand: u32,
    backing_store: HashMap<u64, Vec<u8>>,
    page_faults: u64,
    /// Set once any program has been loaded; blocks `set_page_size`.
    any_job_loaded: bool,
}

impl MemoryManager {
    pub fn new(memory_size: usize, page_size: usize, default_page_limit: usize) -> Self {
        let num_frames = (memory_size / page_size) as u32;
        MemoryManager {
            page_size,
            default_page_limit,
            physical: PhysicalMemory::new(memory_size),
            num_frames,
            free_frames: (0..num_frames).collect(),
            frame_owner: vec![None; num_frames as usize],
            clock_hand: 0,
            backing_store: HashMap::new(),
            page_faults: 0,
            any_job_loaded: false,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_limit(&self) -> usize {
        self.default_page_limit
    }

    pub fn page_faults(&self) -> u64 {
        self.page_faults
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_frames.len()
    }

    pub fn physical(&self) -> &PhysicalMemory {
        &self.physical
    }

    pub fn physical_mut(&mut self) -> &mut PhysicalMemory {
        &mut self.physical
    }

    /// Change the page size. Fails while any job has ever been loaded,
    /// matching the original's "changing `page_size` fails when any job
    /// is loaded".
    pub fn set_page_size(&mut self, page_size: usize) -> Result<(), SystemCode> {
        if self.any_job_loaded {
            return Err(SystemCode::InvalidArgs);
        }
        self.page_size = page_size;
        self.num_frames = (self.physical.len() / page_size) as u32;
        self.free_frames = (0..self.num_frames).collect();
        self.frame_owner = vec![None; self.num_frames as usize];
        self.clock_hand = 0;
        Ok(())
    }

    pub fn set_page_limit(&mut self, limit: usize) {
        self.default_page_limit = limit;
    }

    /// Read the 12-byte header and validate size bounds.
    pub fn prepare_program(&self, path: &Path) -> Result<ProgramDescriptor, SystemCode> {
        if path.as_os_str().is_empty() {
            return Err(SystemCode::InvalidPath);
        }
        let bytes = std::fs::read(path).map_err(|_| SystemCode::FileNotFound)?;
        if bytes.len() < 12 {
            return Err(SystemCode::InvalidSize);
        }
        let byte_size = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let entry_pc = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let loader_base = u32::from_le_bytes(bytes[8..12].try_into().unwrap());

        if byte_size == 0 || (byte_size as usize) > self.physical.len() {
            return Err(SystemCode::InvalidSize);
        }
        let image = &bytes[12..];
        if image.len() != byte_size as usize {
            return Err(SystemCode::LengthMismatch);
        }

        let layout = ProgramLayout {
            loader_base,
            byte_size,
            code_start: entry_pc,
            code_end: loader_base + byte_size - 1,
            data_start: loader_base,
            data_end: entry_pc.wrapping_sub(1),
        };

        Ok(ProgramDescriptor {
            byte_size,
            entry_pc,
            loader_base,
            layout,
            image: image.to_vec(),
        })
    }

    /// Whether a program of `descriptor`'s size could plausibly be
    /// admitted — the demand-paged model only needs at least one frame to
    /// exist at all; residency is arbitrated lazily by `load_page`.
    pub fn check_memory_available(&self, _descriptor: &ProgramDescriptor) -> bool {
        self.num_frames > 0
    }

    /// Install `descriptor`'s image as `pcb`'s backing store and reset its
    /// paging state. Does not touch physical memory — pages are demand
    /// loaded.
    pub fn load_to_memory(&mut self, pcb: &mut Pcb, descriptor: ProgramDescriptor) {
        self.any_job_loaded = true;
        pcb.layout = descriptor.layout;
        pcb.pc = descriptor.entry_pc;
        pcb.num_pages = descriptor.byte_size.div_ceil(self.page_size as u32);
        pcb.max_resident_pages = self.default_page_limit;
        pcb.page_table = crate::memory::paging::PageTable::new();
        self.backing_store.insert(pcb.pid, descriptor.image);
    }

    /// Translate a virtual address in `pcb`'s address space to a physical
    /// one, faulting in the owning page via `others` if necessary.
    pub fn translate(
        &mut self,
        pcb: &mut Pcb,
        virtual_address: u32,
        others: &mut HashMap<u64, Pcb>,
    ) -> Result<usize, SystemCode> {
        let vp = virtual_address / self.page_size as u32;
        let offset = (virtual_address % self.page_size as u32) as usize;
        if vp >= pcb.num_pages {
            return Err(SystemCode::OutOfBounds);
        }
        if !pcb.page_table.is_resident(vp) {
            self.page_faults += 1;
            self.load_page(pcb, vp, others)?;
        }
        let frame = pcb
            .page_table
            .get(vp)
            .and_then(|e| e.frame)
            .ok_or(SystemCode::PageNotResident)?;
        Ok(frame as usize * self.page_size + offset)
    }

    /// Demand-load virtual page `vp` of `pcb`, evicting another page of
    /// `pcb` first if it is already at its resident-page limit, or any
    /// process's page (via `others`) if no frame is free at all.
    pub fn load_page(
        &mut self,
        pcb: &mut Pcb,
        vp: u32,
        others: &mut HashMap<u64, Pcb>,
    ) -> Result<(), SystemCode> {
        if vp >= pcb.num_pages {
            return Err(SystemCode::OutOfBounds);
        }
        if pcb.page_table.is_resident(vp) {
            return Ok(());
        }
        if pcb.resident_pages() >= pcb.max_resident_pages {
            self.evict_page(Some(pcb))?;
        }
        if self.free_frames.is_empty() {
            self.evict_any(pcb, others)?;
        }
        let frame = self.free_frames.pop_front().ok_or(SystemCode::MemoryAlloc)?;

        let store = self
            .backing_store
            .get(&pcb.pid)
            .ok_or(SystemCode::MemoryAlloc)?;
        let start = (vp as usize) * self.page_size;
        let end = (start + self.page_size).min(store.len());
        let chunk = &store[start..end];
        let addr = frame as usize * self.page_size;
        self.physical.write_slice(addr, chunk)?;

        self.frame_owner[frame as usize] = Some(FrameOwner { pid: pcb.pid, vp });
        pcb.page_table.set(
            vp,
            PageTableEntry {
                frame: Some(frame),
                valid: true,
                reference: true,
                dirty: false,
            },
        );
        log::debug!("pid {} loaded page {} into frame {}", pcb.pid, vp, frame);
        Ok(())
    }

    /// Evict one resident page of `target`, or (when `target` is `None`)
    /// the first valid page found across `target`'s own table — callers
    /// needing a cross-process scan use [`MemoryManager::evict_any`].
    pub fn evict_page(&mut self, target: Option<&mut Pcb>) -> Result<(), SystemCode> {
        let pcb = target.ok_or(SystemCode::MemoryAlloc)?;
        let vp = pcb.page_table.any_resident_vp().ok_or(SystemCode::MemoryAlloc)?;
        self.evict_specific(pcb, vp);
        Ok(())
    }

    fn evict_specific(&mut self, pcb: &mut Pcb, vp: u32) {
        if let Some(entry) = pcb.page_table.get(vp) {
            if let Some(frame) = entry.frame {
                self.frame_owner[frame as usize] = None;
                self.free_frames.push_back(frame);
            }
        }
        pcb.page_table.invalidate(vp);
        log::debug!("pid {} evicted page {}", pcb.pid, vp);
    }

    /// Clock (second-chance) sweep over the frame table: clear reference
    /// bits as the hand passes, evict the first frame found with the bit
    /// already clear. `current` is checked first since it may itself be
    /// the owner of the victim frame; `others` holds every other live
    /// process keyed by pid.
    fn evict_any(
        &mut self,
        current: &mut Pcb,
        others: &mut HashMap<u64, Pcb>,
    ) -> Result<(), SystemCode> {
        if self.num_frames == 0 {
            return Err(SystemCode::MemoryAlloc);
        }
        let mut scanned = 0u32;
        loop {
            if scanned > self.num_frames * 2 {
                return Err(SystemCode::MemoryAlloc);
            }
            let idx = self.clock_hand as usize;
            self.clock_hand = (self.clock_hand + 1) % self.num_frames;
            scanned += 1;

            let Some(owner) = self.frame_owner[idx] else {
                continue;
            };

            let reference = if owner.pid == current.pid {
                current.page_table.get(owner.vp).map(|e| e.reference)
            } else if let Some(other) = others.get_mut(&owner.pid) {
                other.page_table.get(owner.vp).map(|e| e.reference)
            } else {
                // Owner no longer tracked (already terminated); treat as
                // evictable immediately.
                Some(false)
            };

            let Some(reference) = reference else { continue };

            if reference {
                if owner.pid == current.pid {
                    if let Some(e) = current.page_table.get_mut(owner.vp) {
                        e.reference = false;
                    }
                } else if let Some(other) = others.get_mut(&owner.pid) {
                    if let Some(e) = other.page_table.get_mut(owner.vp) {
                        e.reference = false;
                    }
                }
                continue;
            }

            if owner.pid == current.pid {
                self.evict_specific(current, owner.vp);
            } else if let Some(other) = others.get_mut(&owner.pid) {
                self.evict_specific(other, owner.vp);
            } else {
                self.frame_owner[idx] = None;
                self.free_frames.push_back(idx as u32);
            }
            return Ok(());
        }
    }

    /// `fork()` support: give `child_pid` its own copy of `parent_pid`'s
    /// backing store, so the child can demand-page the same image
    /// independently (§4.3.3 — "child PCB created... sharing the parent's
    /// image").
    pub fn share_image_on_fork(&mut self, parent_pid: u64, child_pid: u64) {
        if let Some(image) = self.backing_store.get(&parent_pid).cloned() {
            self.backing_store.insert(child_pid, image);
        }
    }

    /// Release all of `pcb`'s frames and drop its backing store, on
    /// termination.
    pub fn free_memory(&mut self, pcb: &mut Pcb) {
        let vps: Vec<u32> = pcb.page_table.resident_vps().collect();
        for vp in vps {
            self.evict_specific(pcb, vp);
        }
        self.backing_store.remove(&pcb.pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_program(dir: &std::path::Path, name: &str, image: &[u8], entry_pc: u32, loader_base: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&(image.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&entry_pc.to_le_bytes()).unwrap();
        f.write_all(&loader_base.to_le_bytes()).unwrap();
        f.write_all(image).unwrap();
        path
    }

    #[test]
    fn prepare_program_rejects_missing_file() {
        let mm = MemoryManager::new(1024, 24, 3);
        let err = mm.prepare_program(std::path::Path::new("/nonexistent/path.bin")).unwrap_err();
        assert_eq!(err, SystemCode::FileNotFound);
    }

    #[test]
    fn prepare_program_rejects_empty_path() {
        let mm = MemoryManager::new(1024, 24, 3);
        let err = mm.prepare_program(std::path::Path::new("")).unwrap_err();
        assert_eq!(err, SystemCode::InvalidPath);
    }

    #[test]
    fn prepare_program_parses_header() {
        let mm = MemoryManager::new(1024, 24, 3);
        let dir = std::env::temp_dir();
        let image = vec![0u8; 24];
        let path = write_program(&dir, "mlfq_sim_test_prepare.bin", &image, 0, 0);
        let desc = mm.prepare_program(&path).unwrap();
        assert_eq!(desc.byte_size, 24);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn load_page_faults_and_respects_resident_limit() {
        let mut mm = MemoryManager::new(240, 24, 2);
        let dir = std::env::temp_dir();
        let image = vec![7u8; 24 * 4];
        let path = write_program(&dir, "mlfq_sim_test_fault.bin", &image, 0, 0);
        let desc = mm.prepare_program(&path).unwrap();
        let mut pcb = Pcb::new(1, "p".into(), 0);
        mm.load_to_memory(&mut pcb, desc);

        let mut others = HashMap::new();
        mm.load_page(&mut pcb, 0, &mut others).unwrap();
        mm.load_page(&mut pcb, 1, &mut others).unwrap();
        assert_eq!(pcb.resident_pages(), 2);
        mm.load_page(&mut pcb, 2, &mut others).unwrap();
        assert_eq!(pcb.resident_pages(), 2);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn free_memory_returns_frames() {
        let mut mm = MemoryManager::new(240, 24, 3);
        let dir = std::env::temp_dir();
        let image = vec![1u8; 24];
        let path = write_program(&dir, "mlfq_sim_test_free.bin", &image, 0, 0);
        let desc = mm.prepare_program(&path).unwrap();
        let mut pcb = Pcb::new(1, "p".into(), 0);
        mm.load_to_memory(&mut pcb, desc);
        let mut others = HashMap::new();
        mm.load_page(&mut pcb, 0, &mut others).unwrap();
        let before = mm.free_frame_count();
        mm.free_memory(&mut pcb);
        assert_eq!(mm.free_frame_count(), before + 1);
        std::fs::remove_file(path).ok();
    }
}
