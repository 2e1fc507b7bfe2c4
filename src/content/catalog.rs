use serde::Serialize;

/// A practice exam that can be loaded from the content root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExamSet {
    pub id: &'static str,
    pub name: &'static str,
}

/// The practice sets shipped with the content bundle
pub const EXAM_SETS: &[ExamSet] = &[
    ExamSet { id: "test_1", name: "上海新高考模拟试题1" },
    ExamSet { id: "test_2", name: "上海新高考模拟试题2" },
    ExamSet { id: "test_3", name: "上海新高考模拟试题3" },
    ExamSet { id: "test_4", name: "上海新高考模拟试题4" },
    ExamSet { id: "test_5", name: "上海新高考模拟试题5" },
    ExamSet { id: "test_6", name: "上海新高考模拟试题6" },
    ExamSet { id: "test_7", name: "上海新高考模拟试题7" },
    ExamSet { id: "test_8", name: "上海新高考模拟试题8" },
    ExamSet { id: "test_9", name: "上海新高考模拟试题9" },
    ExamSet { id: "test_10", name: "上海新高考模拟试题10" },
];

/// Look up a practice set by id
pub fn find_exam_set(exam_id: &str) -> Option<&'static ExamSet> {
    EXAM_SETS.iter().find(|set| set.id == exam_id)
}
