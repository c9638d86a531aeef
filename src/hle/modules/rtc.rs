//! sceRtc: 实时时钟
//!
//! tick 是自 0001-01-01 00:00:00 UTC 起的微秒数。

use std::time::SystemTime;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::emulator::Emulator;
use crate::emulator::ptr::Ptr;
use crate::hle::{Arg, HleArgs, HleCall, HleError, HleFunction, HleModule, Ret, unimplemented};
use crate::utils::bytes::{ByteReader, ByteWriter, BytesError, PspStruct};

pub const TICKS_PER_SECOND: u64 = 1_000_000;
const TICKS_PER_DAY: u64 = 86_400 * TICKS_PER_SECOND;

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some((next - first).num_days() as u32)
}

/// 0 = 星期日；日期无效时为 `None`
pub fn day_of_week(year: i32, month: u32, day: u32) -> Option<u32> {
    NaiveDate::from_ymd_opt(year, month, day).map(|date| date.weekday().num_days_from_sunday())
}

fn naive_to_ticks(time: &NaiveDateTime) -> Option<u64> {
    // 0001-01-01 是公元第 1 天
    let days = u64::try_from(time.date().num_days_from_ce() - 1).ok()?;
    let seconds = time.time().num_seconds_from_midnight() as u64;
    let micros = (time.time().nanosecond() / 1_000).min(999_999) as u64;
    Some(days * TICKS_PER_DAY + seconds * TICKS_PER_SECOND + micros)
}

fn ticks_to_naive(ticks: u64) -> Option<NaiveDateTime> {
    let days = i32::try_from(ticks / TICKS_PER_DAY).ok()?;
    let date = NaiveDate::from_num_days_from_ce_opt(days.checked_add(1)?)?;
    let rem = ticks % TICKS_PER_DAY;
    let seconds = (rem / TICKS_PER_SECOND) as u32;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, (rem % TICKS_PER_SECOND) as u32 * 1_000)?;
    Some(date.and_time(time))
}

/// 早于 0001 年的时间记为 0
pub fn system_time_to_ticks(time: SystemTime) -> u64 {
    naive_to_ticks(&DateTime::<Utc>::from(time).naive_utc()).unwrap_or(0)
}

pub fn current_ticks() -> u64 {
    system_time_to_ticks(SystemTime::now())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScePspDateTime {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub microsecond: u32,
}

impl ScePspDateTime {
    pub fn new(year: u16, month: u16, day: u16, hour: u16, minute: u16, second: u16, microsecond: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            microsecond,
        }
    }

    fn from_naive(time: &NaiveDateTime) -> Option<Self> {
        Some(Self {
            year: u16::try_from(time.year()).ok()?,
            month: time.month() as u16,
            day: time.day() as u16,
            hour: time.hour() as u16,
            minute: time.minute() as u16,
            second: time.second() as u16,
            microsecond: (time.nanosecond() / 1_000).min(999_999),
        })
    }

    /// 年份超出 `u16` 时为 `None`
    pub fn from_ticks(ticks: u64) -> Option<Self> {
        Self::from_naive(&ticks_to_naive(ticks)?)
    }

    /// 无法表示的时间得到全零的记录
    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_naive(&DateTime::<Utc>::from(time).naive_utc()).unwrap_or_default()
    }

    fn to_naive(self) -> Option<NaiveDateTime> {
        if self.year == 0 || self.microsecond >= 1_000_000 {
            return None;
        }
        let date = NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?;
        let time = NaiveTime::from_hms_micro_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
            self.microsecond,
        )?;
        Some(date.and_time(time))
    }

    pub fn is_valid(&self) -> bool {
        self.to_naive().is_some()
    }

    pub fn to_ticks(&self) -> Option<u64> {
        naive_to_ticks(&self.to_naive()?)
    }
}

impl PspStruct for ScePspDateTime {
    const SIZE: usize = 16;

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, BytesError> {
        Ok(Self {
            year: r.u16_le()?,
            month: r.u16_le()?,
            day: r.u16_le()?,
            hour: r.u16_le()?,
            minute: r.u16_le()?,
            second: r.u16_le()?,
            microsecond: r.u32_le()?,
        })
    }

    fn encode(&self, w: &mut ByteWriter) {
        w.u16_le(self.year);
        w.u16_le(self.month);
        w.u16_le(self.day);
        w.u16_le(self.hour);
        w.u16_le(self.minute);
        w.u16_le(self.second);
        w.u32_le(self.microsecond);
    }
}

fn sce_rtc_get_current_tick(emu: &mut Emulator, args: &HleArgs) -> Result<i64, HleError> {
    emu.memory.ptr(args.ptr(0)?).sdw(0, current_ticks())?;
    Ok(0)
}

fn sce_rtc_get_tick_resolution(_emu: &mut Emulator, _args: &HleArgs) -> Result<i64, HleError> {
    Ok(TICKS_PER_SECOND as i64)
}

fn invalid_date(year: i32, month: i32, day: Option<i32>) -> HleError {
    match day {
        Some(day) => HleError::InvalidArgument(format!("无效的日期: {year}-{month}-{day}")),
        None => HleError::InvalidArgument(format!("无效的日期: {year}-{month}")),
    }
}

fn sce_rtc_get_day_of_week(_emu: &mut Emulator, args: &HleArgs) -> Result<i64, HleError> {
    let (year, month, day) = (args.int(0)?, args.int(1)?, args.int(2)?);
    u32::try_from(month)
        .ok()
        .zip(u32::try_from(day).ok())
        .and_then(|(m, d)| day_of_week(year, m, d))
        .map(i64::from)
        .ok_or_else(|| invalid_date(year, month, Some(day)))
}

fn sce_rtc_get_days_in_month(_emu: &mut Emulator, args: &HleArgs) -> Result<i64, HleError> {
    let (year, month) = (args.int(0)?, args.int(1)?);
    u32::try_from(month)
        .ok()
        .and_then(|m| days_in_month(year, m))
        .map(i64::from)
        .ok_or_else(|| invalid_date(year, month, None))
}

fn sce_rtc_is_leap_year(_emu: &mut Emulator, args: &HleArgs) -> Result<i64, HleError> {
    Ok(is_leap_year(args.int(0)?) as i64)
}

fn sce_rtc_set_tick(emu: &mut Emulator, args: &HleArgs) -> Result<i64, HleError> {
    let ticks = emu.memory.ptr(args.ptr(1)?).ldw(0)?;
    let date = ScePspDateTime::from_ticks(ticks)
        .ok_or_else(|| HleError::InvalidArgument(format!("tick 超出可表示范围: {ticks}")))?;
    emu.memory.ptr(args.ptr(0)?).write_struct(&date)?;
    Ok(0)
}

fn sce_rtc_get_tick(emu: &mut Emulator, args: &HleArgs) -> Result<i64, HleError> {
    let date: ScePspDateTime = emu.memory.ptr(args.ptr(0)?).read_struct()?;
    let ticks = date
        .to_ticks()
        .ok_or_else(|| HleError::InvalidArgument(format!("无效的日期: {date:?}")))?;
    emu.memory.ptr(args.ptr(1)?).sdw(0, ticks)?;
    Ok(0)
}

const fn typed(name: &'static str, nid: u32, args: &'static [Arg], func: crate::hle::TypedFn) -> HleFunction {
    HleFunction {
        name,
        nid,
        since: 150,
        call: HleCall::Typed {
            args,
            ret: Ret::Int,
            func,
        },
    }
}

pub static MODULE: HleModule = HleModule {
    name: "sceRtc",
    functions: &[
        typed("sceRtcGetCurrentTick", 0x3F7AD767, &[Arg::Ptr], sce_rtc_get_current_tick),
        typed("sceRtcGetTickResolution", 0xC41C2853, &[], sce_rtc_get_tick_resolution),
        typed("sceRtcGetDayOfWeek", 0x57726BC1, &[Arg::Int, Arg::Int, Arg::Int], sce_rtc_get_day_of_week),
        typed("sceRtcGetDaysInMonth", 0x05EF322C, &[Arg::Int, Arg::Int], sce_rtc_get_days_in_month),
        typed("sceRtcIsLeapYear", 0x42307A17, &[Arg::Int], sce_rtc_is_leap_year),
        typed("sceRtcSetTick", 0x7ED29E40, &[Arg::Ptr, Arg::Ptr], sce_rtc_set_tick),
        typed("sceRtcGetTick", 0x6FF40ACC, &[Arg::Ptr, Arg::Ptr], sce_rtc_get_tick),
        unimplemented("sceRtcGetAccumulativeTime", 0x011F03C1, 150),
        unimplemented("sceRtcFormatRFC3339", 0x0498FB3C, 150),
        unimplemented("sceRtcSetTime64_t", 0x1909C99B, 150),
        unimplemented("sceRtcTickAddMicroseconds", 0x26D25A5D, 150),
        unimplemented("sceRtcTickAddHours", 0x26D7A24A, 150),
        unimplemented("sceRtcGetTime_t", 0x27C4594C, 150),
        unimplemented("sceRtcParseRFC3339", 0x28E1E988, 150),
        unimplemented("sceRtcConvertUtcToLocalTime", 0x34885E0D, 150),
        unimplemented("sceRtcGetDosTime", 0x36075567, 150),
        unimplemented("sceRtcSetTime_t", 0x3A807CC8, 150),
        unimplemented("sceRtcTickAddYears", 0x42842C77, 150),
        unimplemented("sceRtcTickAddTicks", 0x44F45E05, 150),
        unimplemented("sceRtcCheckValid", 0x4B1B5E82, 150),
        unimplemented("sceRtcGetCurrentClock", 0x4CFA57B0, 150),
        unimplemented("sceRtcConvertLocalTimeToUTC", 0x779242A2, 150),
        unimplemented("sceRtcCompareTick", 0x9ED0AE87, 150),
        unimplemented("sceRtcTickAddWeeks", 0xCF3A2CA8, 150),
        unimplemented("sceRtcTickAddMonths", 0xDBF74F1B, 150),
        unimplemented("sceRtcGetTime64_t", 0xE1C93E47, 150),
        unimplemented("sceRtcTickAddDays", 0xE51B4B7A, 150),
        unimplemented("sceRtcTickAddMinutes", 0xE6605BCA, 150),
        unimplemented("sceRtcGetCurrentClockLocalTime", 0xE7C27D1B, 150),
        unimplemented("sceRtcTickAddSeconds", 0xF2A4AFE5, 150),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hle::error_code::*;
    use crate::hle::testing::{call, set_args};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_date_time_layout() {
        let date = ScePspDateTime::new(2024, 3, 15, 10, 30, 0, 500_000);
        let bytes = date.to_bytes();
        assert_eq!(bytes.len(), ScePspDateTime::SIZE);
        assert_eq!(&bytes[0..2], &2024u16.to_le_bytes());
        assert_eq!(&bytes[12..16], &500_000u32.to_le_bytes());
        assert_eq!(ScePspDateTime::from_bytes(&bytes).unwrap(), date);
    }

    #[test]
    fn test_ticks_round_trip() {
        let date = ScePspDateTime::new(2024, 3, 15, 10, 30, 0, 500_000);
        let ticks = date.to_ticks().unwrap();
        assert_eq!(ScePspDateTime::from_ticks(ticks), Some(date));

        assert_eq!(ScePspDateTime::new(1, 1, 1, 0, 0, 0, 0).to_ticks(), Some(0));
        assert_eq!(ScePspDateTime::from_ticks(0), Some(ScePspDateTime::new(1, 1, 1, 0, 0, 0, 0)));
    }

    #[test]
    fn test_unix_epoch_ticks() {
        let epoch = ScePspDateTime::new(1970, 1, 1, 0, 0, 0, 0);
        assert_eq!(epoch.to_ticks(), Some(62_135_596_800 * TICKS_PER_SECOND));
        assert_eq!(system_time_to_ticks(UNIX_EPOCH), 62_135_596_800 * TICKS_PER_SECOND);

        let later = UNIX_EPOCH + Duration::from_secs(86_400 + 1);
        assert_eq!(
            ScePspDateTime::from_system_time(later),
            ScePspDateTime::new(1970, 1, 2, 0, 0, 1, 0)
        );
    }

    #[test]
    fn test_invalid_dates() {
        assert!(ScePspDateTime::new(2023, 2, 29, 0, 0, 0, 0).to_ticks().is_none());
        assert!(ScePspDateTime::new(2024, 13, 1, 0, 0, 0, 0).to_ticks().is_none());
        assert!(ScePspDateTime::new(2024, 1, 1, 24, 0, 0, 0).to_ticks().is_none());
        assert!(ScePspDateTime::new(2024, 1, 1, 0, 0, 0, 1_000_000).to_ticks().is_none());
        assert!(ScePspDateTime::default().to_ticks().is_none());
        assert!(ScePspDateTime::new(0, 1, 1, 0, 0, 0, 0).to_ticks().is_none());
        assert!(ScePspDateTime::new(2024, 1, 1, 23, 59, 59, 1_500_000).to_ticks().is_none());
    }

    #[test]
    fn test_ticks_beyond_u16_year() {
        let last = ScePspDateTime::new(u16::MAX, 12, 31, 23, 59, 59, 999_999);
        let ticks = last.to_ticks().unwrap();
        assert_eq!(ScePspDateTime::from_ticks(ticks), Some(last));
        assert_eq!(ScePspDateTime::from_ticks(ticks + 1), None);
        assert_eq!(ScePspDateTime::from_ticks(u64::MAX), None);
    }

    #[test]
    fn test_calendar_helpers() {
        assert_eq!(day_of_week(2024, 3, 15), Some(5));
        assert_eq!(day_of_week(1970, 1, 1), Some(4));
        assert_eq!(day_of_week(2024, 2, 30), None);
        assert_eq!(day_of_week(2024, 1, 0), None);
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(1900));
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(1900, 2), Some(28));
        assert_eq!(days_in_month(2000, 2), Some(29));
        assert_eq!(days_in_month(2024, 0), None);
        assert_eq!(days_in_month(2024, 12), Some(31));
    }

    #[test]
    fn test_syscalls() {
        let mut emu = Emulator::for_test(&[&MODULE]);
        assert_eq!(call(&mut emu, 0xC41C2853), 1_000_000);

        set_args(&mut emu, &[2024, 3, 15]);
        assert_eq!(call(&mut emu, 0x57726BC1), 5);
        set_args(&mut emu, &[2024, 3, 0]);
        assert_eq!(call(&mut emu, 0x57726BC1), SCE_ERROR_ERRNO_INVALID_ARGUMENT);
        set_args(&mut emu, &[2024, 3, 40]);
        assert_eq!(call(&mut emu, 0x57726BC1), SCE_ERROR_ERRNO_INVALID_ARGUMENT);

        set_args(&mut emu, &[2024, 2]);
        assert_eq!(call(&mut emu, 0x05EF322C), 29);
        set_args(&mut emu, &[2024, 13]);
        assert_eq!(call(&mut emu, 0x05EF322C), SCE_ERROR_ERRNO_INVALID_ARGUMENT);

        set_args(&mut emu, &[2000]);
        assert_eq!(call(&mut emu, 0x42307A17), 1);

        // 未移植
        assert_eq!(call(&mut emu, 0x9ED0AE87), SCE_KERNEL_ERROR_ERROR);
    }

    #[test]
    fn test_get_and_set_tick() {
        let mut emu = Emulator::for_test(&[&MODULE]);
        let date_addr = emu.memory.base() + 0x1000;
        let tick_addr = emu.memory.base() + 0x1040;
        let date = ScePspDateTime::new(2024, 3, 15, 10, 30, 0, 500_000);
        emu.memory.ptr(date_addr).write_struct(&date).unwrap();

        set_args(&mut emu, &[date_addr, tick_addr]);
        assert_eq!(call(&mut emu, 0x6FF40ACC), 0);
        let ticks = emu.memory.ptr(tick_addr).ldw(0).unwrap();
        assert_eq!(ticks, date.to_ticks().unwrap());

        let out_addr = emu.memory.base() + 0x1080;
        set_args(&mut emu, &[out_addr, tick_addr]);
        assert_eq!(call(&mut emu, 0x7ED29E40), 0);
        let back: ScePspDateTime = emu.memory.ptr(out_addr).read_struct().unwrap();
        assert_eq!(back, date);
    }

    #[test]
    fn test_set_tick_out_of_range() {
        let mut emu = Emulator::for_test(&[&MODULE]);
        let out_addr = emu.memory.base() + 0x1000;
        let tick_addr = emu.memory.base() + 0x1040;
        emu.memory.ptr(tick_addr).sdw(0, u64::MAX).unwrap();

        set_args(&mut emu, &[out_addr, tick_addr]);
        assert_eq!(call(&mut emu, 0x7ED29E40), SCE_ERROR_ERRNO_INVALID_ARGUMENT);
        // 失败时不写输出
        assert_eq!(emu.memory.read(out_addr, ScePspDateTime::SIZE).unwrap(), vec![0; ScePspDateTime::SIZE]);
    }

    #[test]
    fn test_current_tick_is_after_2020() {
        let mut emu = Emulator::for_test(&[&MODULE]);
        let addr = emu.memory.base() + 0x100;
        set_args(&mut emu, &[addr]);
        assert_eq!(call(&mut emu, 0x3F7AD767), 0);
        let ticks = emu.memory.ptr(addr).ldw(0).unwrap();
        let year_2020 = ScePspDateTime::new(2020, 1, 1, 0, 0, 0, 0).to_ticks().unwrap();
        assert!(ticks > year_2020);

        set_args(&mut emu, &[0]);
        assert_eq!(call(&mut emu, 0x3F7AD767), SCE_KERNEL_ERROR_ILLEGAL_ADDR);
    }
}
