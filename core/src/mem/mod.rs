pub const BIOS_SIZE: usize = 16 * 1024;
pub const EWRAM_SIZE: usize = 256 * 1024;
pub const IWRAM_SIZE: usize = 32 * 1024;
pub const PALETTE_SIZE: usize = 1024;
pub const VRAM_SIZE: usize = 96 * 1024;
pub const OAM_SIZE: usize = 1024;
pub const SRAM_SIZE: usize = 64 * 1024;

/// Backing stores for every memory region except I/O.
pub struct Mem {
    pub bios: Vec<u8>,      // 16KB, read-only to the CPU
    pub ewram: Vec<u8>,     // 256KB on-board work RAM
    pub iwram: Vec<u8>,     // 32KB on-chip work RAM
    pub palette: Vec<u8>,   // 1KB
    pub vram: Vec<u8>,      // 96KB
    pub oam: Vec<u8>,       // 1KB
    pub rom: Vec<u8>,       // sized to the loaded image
    pub sram: Vec<u8>,      // 64KB
}

impl Default for Mem {
    fn default() -> Self {
        Self::new()
    }
}

impl Mem {
    pub fn new() -> Self {
        Self {
            bios: vec![0u8; BIOS_SIZE],
            ewram: vec![0u8; EWRAM_SIZE],
            iwram: vec![0u8; IWRAM_SIZE],
            palette: vec![0u8; PALETTE_SIZE],
            vram: vec![0u8; VRAM_SIZE],
            oam: vec![0u8; OAM_SIZE],
            rom: Vec::new(),
            sram: vec![0xFFu8; SRAM_SIZE],
        }
    }

    /// Clear RAM-like regions. SRAM reads back as erased flash (all ones).
    /// The BIOS and cartridge images are kept.
    pub fn reset(&mut self) {
        self.ewram.fill(0);
        self.iwram.fill(0);
        self.palette.fill(0);
        self.vram.fill(0);
        self.oam.fill(0);
        self.sram.fill(0xFF);
    }

    /// Copy a boot image, truncating anything past the BIOS capacity.
    pub fn load_bios(&mut self, data: &[u8]) {
        let len = data.len().min(BIOS_SIZE);
        self.bios.fill(0);
        self.bios[..len].copy_from_slice(&data[..len]);
    }

    /// Replace the cartridge image; storage is resized to fit.
    pub fn load_rom(&mut self, data: &[u8]) {
        self.rom.clear();
        self.rom.extend_from_slice(data);
    }
}
