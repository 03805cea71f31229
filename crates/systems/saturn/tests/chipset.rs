use emu_core::{FlatMemory, MemoryBus};
use emu_saturn::{
    Chipset, ChipsetConfig, ClockSpeed, CpuControl, CpuId, DateTime, DmaTransfer, FixedClock,
    InterruptSink, InterruptSource, ScanlineReport, SmpcCommand,
};

const SMPC: u32 = 0x2010_0000;
const SCU: u32 = 0x25FE_0000;
const IMS: u32 = SCU + 0xA0;
const T0C: u32 = SCU + 0x90;

#[derive(Default)]
struct TestCpu {
    resets: Vec<CpuId>,
    halted: Vec<CpuId>,
    released: Vec<CpuId>,
    nmis: usize,
    clocks: Vec<ClockSpeed>,
    interrupts: Vec<(u8, u8)>,
}

impl TestCpu {
    fn vectors(&self) -> Vec<u8> {
        self.interrupts.iter().map(|&(_, v)| v).collect()
    }
}

impl CpuControl for TestCpu {
    fn reset(&mut self, cpu: CpuId) {
        self.resets.push(cpu);
    }

    fn halt_assert(&mut self, cpu: CpuId) {
        self.halted.push(cpu);
    }

    fn halt_clear(&mut self, cpu: CpuId) {
        self.released.push(cpu);
    }

    fn request_nmi(&mut self) {
        self.nmis += 1;
    }

    fn change_clock(&mut self, speed: ClockSpeed) {
        self.clocks.push(speed);
    }
}

impl InterruptSink for TestCpu {
    fn accept_interrupt(&mut self, level: u8, vector: u8) -> bool {
        self.interrupts.push((level, vector));
        true
    }
}

fn unmask_only(chip: &mut Chipset, cpu: &mut TestCpu, sources: &[InterruptSource]) {
    let enabled = sources.iter().fold(0, |acc, s| acc | s.bit());
    chip.write_long(IMS, !enabled, cpu);
}

fn count(reports: &[ScanlineReport], source: InterruptSource) -> usize {
    reports
        .iter()
        .flat_map(|r| r.events.iter())
        .filter(|&&s| s == source)
        .count()
}

#[test]
fn test_frame_sequence_263_223() {
    let config = ChipsetConfig {
        total_lines: 263,
        active_lines: 223,
        ..ChipsetConfig::ntsc()
    };
    let mut chip = Chipset::new(config).unwrap();
    let mut mem = FlatMemory::new(0x1000);
    let mut cpu = TestCpu::default();
    chip.write_long(IMS, 0, &mut cpu);
    chip.write_long(T0C, 0x1FF, &mut cpu);

    let reports = chip.step_frame(&mut mem, &mut cpu);
    assert_eq!(reports.len(), 263);
    assert_eq!(count(&reports, InterruptSource::VBlankOut), 1);
    assert_eq!(count(&reports, InterruptSource::VBlankIn), 1);
    assert_eq!(count(&reports, InterruptSource::SpriteDrawEnd), 1);
    assert_eq!(count(&reports, InterruptSource::HBlankIn), 223);
    assert_eq!(reports[0].events, vec![InterruptSource::VBlankOut]);
    assert_eq!(
        reports[224].events,
        vec![InterruptSource::VBlankIn, InterruptSource::SpriteDrawEnd]
    );

    // Every unmasked event was delivered
    assert_eq!(cpu.interrupts.len(), 1 + 1 + 1 + 223);
}

#[test]
fn test_direct_dma_through_registers() {
    let mut chip = Chipset::new(ChipsetConfig::ntsc()).unwrap();
    let mut mem = FlatMemory::new(0x1_0000);
    let data: Vec<u8> = (0..16).map(|i| 0xA0 + i).collect();
    mem.load(0x4000, &data);
    let mut cpu = TestCpu::default();
    unmask_only(&mut chip, &mut cpu, &[InterruptSource::Dma0End]);

    chip.write_long(SCU + 0x00, 0x4000, &mut cpu);
    chip.write_long(SCU + 0x04, 0x6000, &mut cpu);
    chip.write_long(SCU + 0x08, 16, &mut cpu);
    chip.write_long(SCU + 0x0C, 0x101, &mut cpu);
    chip.write_long(SCU + 0x14, 0x07, &mut cpu);
    chip.write_long(SCU + 0x10, 0x101, &mut cpu);
    assert_eq!(chip.read_long(SCU + 0x7C), 1);

    let report = chip.step_scanline(&mut mem, &mut cpu);
    assert_eq!(report.dma.len(), 1);
    assert_eq!(mem.slice(0x6000, 16), data);
    assert_eq!(chip.read_long(SCU + 0x7C), 0);

    let channel = chip.scu().dma().channel(0).unwrap();
    assert_eq!(channel.remaining_length(), 0);
    assert!(!channel.is_active());
    assert_eq!(cpu.interrupts, vec![(5, 0x4B)]);
}

#[test]
fn test_indirect_chain_raises_one_completion() {
    let mut chip = Chipset::new(ChipsetConfig::ntsc()).unwrap();
    let mut mem = FlatMemory::new(0x1_0000);
    let mut cpu = TestCpu::default();
    unmask_only(&mut chip, &mut cpu, &[InterruptSource::Dma1End]);

    let chunks: [(u32, u32, u32); 3] = [(4, 0x1000, 0x5000), (8, 0x1100, 0x5100), (2, 0x1200, 0x5200)];
    for (i, &(len, src, dst)) in chunks.iter().enumerate() {
        let bytes: Vec<u8> = (0..len as u8).map(|b| b + 1 + 16 * i as u8).collect();
        mem.load(src, &bytes);
        let entry = 0x800 + 12 * i as u32;
        let last = if i == 2 { 0x8000_0000 } else { 0 };
        mem.write_long(entry, len);
        mem.write_long(entry + 4, dst);
        mem.write_long(entry + 8, src | last);
    }

    chip.scu_mut()
        .dma_mut()
        .start(1, DmaTransfer::indirect(0x800))
        .unwrap();
    let report = chip.step_scanline(&mut mem, &mut cpu);

    assert_eq!(report.dma.len(), 1);
    assert!(!report.dma[0].aborted);
    for (i, &(len, src, dst)) in chunks.iter().enumerate() {
        assert_eq!(mem.slice(dst, len as usize), mem.slice(src, len as usize), "chunk {}", i);
    }
    assert_eq!(cpu.vectors(), vec![0x4A]);
}

#[test]
fn test_level0_preempts_level2() {
    let config = ChipsetConfig {
        dma_units_per_line: 10,
        ..ChipsetConfig::ntsc()
    };
    let source: Vec<u8> = (0..100u32).map(|i| (i * 3 + 1) as u8).collect();

    // Reference: level 2 on its own
    let mut solo_mem = FlatMemory::new(0x1_0000);
    solo_mem.load(0x1000, &source);
    let mut solo = Chipset::new(config.clone()).unwrap();
    let mut solo_cpu = TestCpu::default();
    solo.scu_mut()
        .dma_mut()
        .start(2, DmaTransfer::direct(0x1000, 0x3000, 100))
        .unwrap();
    for _ in 0..12 {
        solo.step_scanline(&mut solo_mem, &mut solo_cpu);
    }

    let mut mem = FlatMemory::new(0x1_0000);
    mem.load(0x1000, &source);
    mem.load(0x2000, &[0xDE, 0xAD, 0xBE, 0xEF]);
    let mut chip = Chipset::new(config).unwrap();
    let mut cpu = TestCpu::default();
    unmask_only(
        &mut chip,
        &mut cpu,
        &[InterruptSource::Dma0End, InterruptSource::Dma2End],
    );

    chip.scu_mut()
        .dma_mut()
        .start(2, DmaTransfer::direct(0x1000, 0x3000, 100))
        .unwrap();
    chip.step_scanline(&mut mem, &mut cpu);
    assert_eq!(chip.scu().dma().channel(2).unwrap().remaining_length(), 90);

    chip.scu_mut()
        .dma_mut()
        .start(0, DmaTransfer::direct(0x2000, 0x4000, 4))
        .unwrap();
    let mut order = Vec::new();
    for _ in 0..12 {
        let report = chip.step_scanline(&mut mem, &mut cpu);
        order.extend(report.dma.iter().map(|d| d.level));
    }

    assert_eq!(order, vec![0, 2]);
    assert_eq!(cpu.vectors(), vec![0x4B, 0x49]);
    assert_eq!(mem.slice(0x4000, 4), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(mem.slice(0x3000, 100), solo_mem.slice(0x3000, 100));
    assert_eq!(mem.slice(0x3000, 100), source);
}

#[test]
fn test_masking_does_not_disturb_timer_counts() {
    let mut masked = Chipset::new(ChipsetConfig::ntsc()).unwrap();
    let mut reference = Chipset::new(ChipsetConfig::ntsc()).unwrap();
    let mut mem = FlatMemory::new(0x1000);
    let mut cpu_masked = TestCpu::default();
    let mut cpu_reference = TestCpu::default();

    for (chip, cpu) in [
        (&mut masked, &mut cpu_masked),
        (&mut reference, &mut cpu_reference),
    ] {
        chip.write_long(T0C, 150, cpu);
    }
    unmask_only(&mut reference, &mut cpu_reference, &[InterruptSource::Timer0]);
    unmask_only(&mut masked, &mut cpu_masked, &[]);

    for line in 0..263 {
        if line == 100 {
            unmask_only(&mut masked, &mut cpu_masked, &[InterruptSource::Timer0]);
        }
        masked.step_scanline(&mut mem, &mut cpu_masked);
        reference.step_scanline(&mut mem, &mut cpu_reference);
        assert_eq!(
            masked.scu().timers().timer0_count(),
            reference.scu().timers().timer0_count(),
            "line {}",
            line
        );
    }
    assert_eq!(cpu_masked.interrupts, vec![(12, 0x43)]);
    assert_eq!(cpu_masked.interrupts, cpu_reference.interrupts);
}

#[test]
fn test_intback_through_bus() {
    let mut chip = Chipset::new(ChipsetConfig::ntsc()).unwrap();
    chip.set_rtc(Box::new(FixedClock(DateTime {
        year: 2024,
        month: 3,
        day: 5,
        weekday: 2,
        hour: 14,
        minute: 7,
        second: 9,
    })));
    let mut mem = FlatMemory::new(0x1000);
    let mut cpu = TestCpu::default();
    unmask_only(&mut chip, &mut cpu, &[InterruptSource::SystemManager]);

    chip.write_byte(SMPC + 0x63, 0x01, &mut cpu);
    chip.write_byte(SMPC + 0x1F, SmpcCommand::IntBack.opcode(), &mut cpu);
    assert_eq!(chip.read_byte(SMPC + 0x63), 0);

    let time: Vec<u8> = (1..=7).map(|n| chip.read_byte(SMPC + 0x21 + 2 * n)).collect();
    assert_eq!(time, vec![0x20, 0x24, 0x23, 0x05, 0x14, 0x07, 0x09]);

    chip.step_scanline(&mut mem, &mut cpu);
    assert_eq!(cpu.interrupts, vec![(8, 0x47)]);
}

#[test]
fn test_exle_pad_interrupt_is_immediate() {
    let mut chip = Chipset::new(ChipsetConfig::ntsc()).unwrap();
    let mut cpu = TestCpu::default();
    unmask_only(&mut chip, &mut cpu, &[InterruptSource::Pad]);

    chip.write_byte(SMPC + 0x7F, 0x01, &mut cpu);
    assert!(chip.scu().interrupts().is_pending(InterruptSource::Pad));
}

#[test]
fn test_power_commands_reach_cpu_lines() {
    let mut chip = Chipset::new(ChipsetConfig::ntsc()).unwrap();
    let mut cpu = TestCpu::default();

    for command in [
        SmpcCommand::SlaveOn,
        SmpcCommand::SoundOn,
        SmpcCommand::ClockChange352,
        SmpcCommand::SystemReset,
    ] {
        chip.write_byte(SMPC + 0x1F, command.opcode(), &mut cpu);
    }

    assert_eq!(cpu.resets, vec![CpuId::Slave, CpuId::Sound, CpuId::Master]);
    assert_eq!(cpu.released, vec![CpuId::Slave, CpuId::Sound]);
    assert_eq!(cpu.halted, vec![CpuId::Slave]);
    assert_eq!(cpu.clocks, vec![ClockSpeed::Dot352]);
    assert_eq!(cpu.nmis, 1);
    assert_eq!(chip.smpc().clock_speed(), ClockSpeed::Dot352);
}

#[test]
fn test_save_state_resumes_partial_dma() {
    let config = ChipsetConfig {
        dma_units_per_line: 8,
        ..ChipsetConfig::ntsc()
    };
    let mut mem = FlatMemory::new(0x1_0000);
    let data: Vec<u8> = (0..40).map(|i| 0x40 ^ i).collect();
    mem.load(0x1000, &data);

    let mut chip = Chipset::new(config.clone()).unwrap();
    let mut cpu = TestCpu::default();
    unmask_only(&mut chip, &mut cpu, &[InterruptSource::Dma1End]);
    chip.scu_mut()
        .dma_mut()
        .start(1, DmaTransfer::direct(0x1000, 0x2000, 40))
        .unwrap();
    chip.step_scanline(&mut mem, &mut cpu);
    chip.step_scanline(&mut mem, &mut cpu);

    let state = chip.save_state();
    let mut restored_mem = mem.clone();

    let mut restored = Chipset::new(config).unwrap();
    let mut restored_cpu = TestCpu::default();
    restored.load_state(&state).unwrap();
    assert_eq!(
        restored.scu().dma().channel(1).unwrap().remaining_length(),
        24
    );
    assert_eq!(restored.clock().frame(), chip.clock().frame());

    for _ in 0..3 {
        chip.step_scanline(&mut mem, &mut cpu);
        restored.step_scanline(&mut restored_mem, &mut restored_cpu);
    }
    assert_eq!(restored_mem.slice(0x2000, 40), data);
    assert_eq!(mem.slice(0x2000, 40), data);
    assert_eq!(restored_cpu.interrupts, cpu.interrupts);
    assert_eq!(restored_cpu.vectors(), vec![0x4A]);
}
