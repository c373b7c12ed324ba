use chrono::NaiveDate;

use crate::models::{AttendanceRecord, Student};

/// Returns the student's record for `date`, creating an empty one when the
/// date has never been synchronized. The flag is `true` when a record was created.
pub fn ensure_record(student: &mut Student, date: NaiveDate) -> (&mut AttendanceRecord, bool) {
    match student.attendance.iter().position(|r| r.date == date) {
        Some(index) => (&mut student.attendance[index], false),
        None => {
            student.attendance.push(AttendanceRecord {
                student_id: student.id,
                date,
                marks: Vec::new(),
            });
            let last = student.attendance.len() - 1;
            (&mut student.attendance[last], true)
        }
    }
}

/// Grows the mark vector with absences or cuts it from the tail until it holds
/// exactly `required` slots. Cut marks are gone for good.
pub fn sync_marks(record: &mut AttendanceRecord, required: usize) {
    record.marks.resize(required, false);
}

/// Ensure + sync in one step. Returns whether the record was newly created.
pub fn synchronize(student: &mut Student, date: NaiveDate, required: usize) -> bool {
    let (record, created) = ensure_record(student, date);
    sync_marks(record, required);
    created
}

pub fn record_for(student: &Student, date: NaiveDate) -> Option<&AttendanceRecord> {
    student.attendance.iter().find(|r| r.date == date)
}

pub fn attended_total(student: &Student) -> usize {
    student
        .attendance
        .iter()
        .map(|r| r.marks.iter().filter(|present| **present).count())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 9, 4).unwrap()
    }

    #[test]
    fn fresh_record_is_filled_with_absences() {
        let mut student = Student::new("Иванов", Uuid::new_v4());
        let created = synchronize(&mut student, monday(), 3);
        assert!(created);
        assert_eq!(student.attendance.len(), 1);
        assert_eq!(student.attendance[0].marks, vec![false, false, false]);
        assert_eq!(student.attendance[0].student_id, student.id);
    }

    #[test]
    fn ensure_record_is_unique_per_date() {
        let mut student = Student::new("Петров", Uuid::new_v4());
        let (_, first) = ensure_record(&mut student, monday());
        let (_, second) = ensure_record(&mut student, monday());
        assert!(first);
        assert!(!second);
        assert_eq!(student.attendance.len(), 1);
    }

    #[test]
    fn sync_is_idempotent() {
        let mut student = Student::new("Сидоров", Uuid::new_v4());
        synchronize(&mut student, monday(), 2);
        student.attendance[0].marks[1] = true;
        let once = student.attendance[0].clone();
        synchronize(&mut student, monday(), 2);
        assert_eq!(student.attendance[0], once);
    }

    #[test]
    fn shrink_then_regrow_loses_tail_marks() {
        let mut record = AttendanceRecord {
            student_id: Uuid::new_v4(),
            date: monday(),
            marks: vec![true, true, true],
        };
        sync_marks(&mut record, 1);
        assert_eq!(record.marks, vec![true]);
        sync_marks(&mut record, 3);
        assert_eq!(record.marks, vec![true, false, false]);
        sync_marks(&mut record, 0);
        assert!(record.marks.is_empty());
    }

    #[test]
    fn attended_total_counts_present_marks() {
        let mut student = Student::new("Кузнецова", Uuid::new_v4());
        synchronize(&mut student, monday(), 3);
        synchronize(&mut student, monday() + chrono::Duration::days(1), 2);
        student.attendance[0].marks[0] = true;
        student.attendance[1].marks = vec![true, true];
        assert_eq!(attended_total(&student), 3);
    }
}
